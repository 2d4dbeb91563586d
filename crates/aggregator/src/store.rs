//! Storage boundary: participant records in, claim records out.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use stakepool_core::numeric;
use stakepool_core::{Participant, PoolKey, PoolKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("SQL migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("record {record_id}: {reason}")]
    Decode { record_id: String, reason: String },

    #[error("unknown participant record {0}")]
    UnknownRecord(String),

    #[error("write rejected: {0}")]
    WriteFailed(String),
}

/// Fields written back to a participant once its pool is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantUpdate {
    pub reward: BigUint,
    pub finalized: bool,
}

/// Claim material persisted per participant after the root is on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub record_id: String,
    pub kind: PoolKind,
    pub pool_key: PoolKey,
    pub identity_key: String,
    pub address: String,
    pub session_id: Option<String>,
    #[serde(with = "numeric::decimal")]
    pub reward: BigUint,
    pub message_hash: String,
    pub signature_r: String,
    pub signature_s: String,
    pub public_key: String,
    /// Sibling hashes, leaf level first, canonical hex.
    pub proof: Vec<String>,
    pub expiry: u64,
    pub processed_at: u64,
}

#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Every participant of the pool, finalized or not.
    async fn fetch_participants(&self, kind: PoolKind, key: &PoolKey) -> Result<Vec<Participant>, StorageError>;

    /// Distinct keys of pools with at least one unfinalized participant, oldest first.
    async fn fetch_unfinalized_pool_keys(&self, kind: PoolKind) -> Result<Vec<PoolKey>, StorageError>;

    async fn update_participant(&self, record_id: &str, update: &ParticipantUpdate) -> Result<(), StorageError>;

    /// Upsert keyed on `(record_id, day, period)`.
    async fn insert_claim_records(&self, records: &[ClaimRecord]) -> Result<(), StorageError>;
}

pub type StoreObj = Arc<dyn ParticipantStore>;

#[derive(Debug, Clone)]
struct StoredParticipant {
    kind: PoolKind,
    pool_key: PoolKey,
    participant: Participant,
    reward: Option<BigUint>,
    finalized: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    participants: Vec<StoredParticipant>,
    claims: BTreeMap<(String, PoolKey), ClaimRecord>,
    writes: usize,
    fail_writes_after: Option<usize>,
}

impl MemoryState {
    fn begin_write(&mut self) -> Result<(), StorageError> {
        if let Some(limit) = self.fail_writes_after {
            if self.writes >= limit {
                return Err(StorageError::WriteFailed(format!("injected failure after {limit} writes")));
            }
        }
        self.writes += 1;
        Ok(())
    }
}

/// In-memory store for tests and dry runs. Counts every write call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_participant(&self, kind: PoolKind, pool_key: PoolKey, participant: Participant) {
        self.state().participants.push(StoredParticipant {
            kind,
            pool_key,
            participant,
            reward: None,
            finalized: false,
        });
    }

    /// Reject every write once `limit` writes have succeeded.
    pub fn fail_writes_after(&self, limit: usize) {
        self.state().fail_writes_after = Some(limit);
    }

    pub fn clear_write_failures(&self) {
        self.state().fail_writes_after = None;
    }

    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    pub fn claims(&self) -> Vec<ClaimRecord> {
        self.state().claims.values().cloned().collect()
    }

    /// `(reward, finalized)` as last written for a record.
    pub fn participant_state(&self, record_id: &str) -> Option<(Option<BigUint>, bool)> {
        self.state()
            .participants
            .iter()
            .find(|p| p.participant.record_id == record_id)
            .map(|p| (p.reward.clone(), p.finalized))
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn fetch_participants(&self, kind: PoolKind, key: &PoolKey) -> Result<Vec<Participant>, StorageError> {
        Ok(self
            .state()
            .participants
            .iter()
            .filter(|p| p.kind == kind && p.pool_key == *key)
            .map(|p| p.participant.clone())
            .collect())
    }

    async fn fetch_unfinalized_pool_keys(&self, kind: PoolKind) -> Result<Vec<PoolKey>, StorageError> {
        let keys: BTreeSet<PoolKey> = self
            .state()
            .participants
            .iter()
            .filter(|p| p.kind == kind && !p.finalized)
            .map(|p| p.pool_key)
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn update_participant(&self, record_id: &str, update: &ParticipantUpdate) -> Result<(), StorageError> {
        let mut state = self.state();
        state.begin_write()?;
        let stored = state
            .participants
            .iter_mut()
            .find(|p| p.participant.record_id == record_id)
            .ok_or_else(|| StorageError::UnknownRecord(record_id.to_string()))?;
        stored.reward = Some(update.reward.clone());
        stored.finalized = update.finalized;
        Ok(())
    }

    async fn insert_claim_records(&self, records: &[ClaimRecord]) -> Result<(), StorageError> {
        let mut state = self.state();
        state.begin_write()?;
        for record in records {
            state
                .claims
                .insert((record.record_id.clone(), record.pool_key), record.clone());
        }
        Ok(())
    }
}
