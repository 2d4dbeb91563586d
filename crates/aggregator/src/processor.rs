//! Single-pool state machine.
//!
//! `CHECK_TIMING -> FETCH -> VALIDATE -> COMPUTE -> COMMIT -> PUBLISH ->
//! SIGN_AND_PERSIST -> DONE`. Nothing is written to the store unless the root
//! has been confirmed on-chain and read back unchanged.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stakepool_core::numeric::{felt_to_hex, parse_felt};
use stakepool_core::{Felt, Participant, PoolKey, PoolKind, PoolSummary, ProcessingResult};
use stakepool_crypto::{voucher_expiry, ClaimFields, OutcomeSigner};
use stakepool_merkle::{proof_to_hex, MerkleError};
use tracing::{error, info, warn};

use crate::batch::PoolBatch;
use crate::poster::RootPublisher;
use crate::store::{ClaimRecord, ParticipantUpdate, StoreObj};
use crate::ProcessError;

/// Contract and verifier key for one pool kind.
#[derive(Debug, Clone)]
pub struct PoolKindConfig {
    pub contract_address: Felt,
    pub signer: OutcomeSigner,
}

/// Whether a pool kind can be processed at all.
#[derive(Debug, Clone)]
pub enum PoolSetup {
    Configured(PoolKindConfig),
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooEarly { remaining_secs: u64 },
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooEarly { remaining_secs } => {
                write!(f, "too early, pool is ready in {remaining_secs}s")
            }
            Self::Empty => write!(f, "no participants"),
        }
    }
}

#[derive(Debug)]
pub enum PoolOutcome {
    Done(PoolSummary),
    Skipped(SkipReason),
    Failed(ProcessError),
}

impl PoolOutcome {
    pub fn is_too_early(&self) -> bool {
        matches!(self, Self::Skipped(SkipReason::TooEarly { .. }))
    }

    /// Skip message or error string; `None` for a finished pool.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Done(_) => None,
            Self::Skipped(reason) => Some(reason.to_string()),
            Self::Failed(err) => Some(err.to_string()),
        }
    }

    pub fn into_result(self) -> ProcessingResult {
        match self {
            Self::Done(summary) => ProcessingResult {
                success: true,
                transaction_hash: summary.transaction_hash.clone(),
                summary: Some(summary),
                message: None,
            },
            Self::Skipped(reason) => ProcessingResult {
                success: true,
                summary: None,
                transaction_hash: None,
                message: Some(reason.to_string()),
            },
            Self::Failed(err) => ProcessingResult {
                success: false,
                summary: None,
                transaction_hash: None,
                message: Some(err.to_string()),
            },
        }
    }
}

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Runs one pool at a time through fetch, commit, publish and persist.
pub struct PoolProcessor {
    store: StoreObj,
    publisher: RootPublisher,
    penalty: PoolSetup,
    session: PoolSetup,
    clock: Clock,
}

impl PoolProcessor {
    pub fn new(store: StoreObj, publisher: RootPublisher) -> Self {
        Self {
            store,
            publisher,
            penalty: PoolSetup::NotConfigured,
            session: PoolSetup::NotConfigured,
            clock: Arc::new(unix_now),
        }
    }

    pub fn with_pool(mut self, kind: PoolKind, setup: PoolSetup) -> Self {
        match kind {
            PoolKind::Penalty => self.penalty = setup,
            PoolKind::Session => self.session = setup,
        }
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn setup(&self, kind: PoolKind) -> &PoolSetup {
        match kind {
            PoolKind::Penalty => &self.penalty,
            PoolKind::Session => &self.session,
        }
    }

    pub fn is_configured(&self, kind: PoolKind) -> bool {
        matches!(self.setup(kind), PoolSetup::Configured(_))
    }

    pub fn store(&self) -> &StoreObj {
        &self.store
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Process one pool. Never panics and never returns early with an error:
    /// every failure is logged here and reported as [`PoolOutcome::Failed`].
    pub async fn process_pool(&self, kind: PoolKind, key: PoolKey, force: bool) -> PoolOutcome {
        let config = match self.setup(kind) {
            PoolSetup::Configured(config) => config,
            PoolSetup::NotConfigured => {
                warn!(%kind, day = key.day, period = key.period, "pool kind not configured");
                return PoolOutcome::Failed(ProcessError::NotConfigured(kind));
            }
        };

        let now = self.now();
        if let Some(remaining_secs) = key.seconds_until_ready(now) {
            if !force {
                info!(%kind, day = key.day, period = key.period, remaining_secs, "pool not ready yet");
                return PoolOutcome::Skipped(SkipReason::TooEarly { remaining_secs });
            }
            warn!(%kind, day = key.day, period = key.period, remaining_secs, "forcing pool before ready time");
        }

        match self.run(kind, key, config, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%kind, day = key.day, period = key.period, error = %err, "pool processing failed");
                PoolOutcome::Failed(err)
            }
        }
    }

    async fn run(
        &self,
        kind: PoolKind,
        key: PoolKey,
        config: &PoolKindConfig,
        now: u64,
    ) -> Result<PoolOutcome, ProcessError> {
        let participants = self.store.fetch_participants(kind, &key).await?;
        if participants.is_empty() {
            info!(%kind, day = key.day, period = key.period, "pool has no participants");
            return Ok(PoolOutcome::Skipped(SkipReason::Empty));
        }
        info!(%kind, day = key.day, period = key.period, participants = participants.len(), "processing pool");

        let batch = PoolBatch::build(kind, key, participants)?;

        let receipt = self
            .publisher
            .publish(config.contract_address, &key, batch.commitment.root)
            .await?;

        let expiry = voucher_expiry(now);
        let records = claim_records(&batch, &config.signer, expiry, now)?;
        self.store.insert_claim_records(&records).await?;
        for participant in &batch.participants {
            let update = ParticipantUpdate {
                reward: batch.reward_for(participant),
                finalized: true,
            };
            self.store.update_participant(&participant.record_id, &update).await?;
        }

        let summary = batch.summary(receipt.transaction_hash);
        info!(
            %kind,
            day = key.day,
            period = key.period,
            root = %summary.root,
            tx = summary.transaction_hash.as_deref().unwrap_or("-"),
            resumed = summary.resumed,
            claims = records.len(),
            "pool finalized"
        );
        Ok(PoolOutcome::Done(summary))
    }
}

fn felt_field(field: &'static str, value: &str) -> Result<Felt, MerkleError> {
    parse_felt(value).map_err(|_| MerkleError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn claim_fields(batch: &PoolBatch, participant: &Participant) -> Result<ClaimFields, MerkleError> {
    let amount = batch.reward_for(participant);
    Ok(match participant.session_id() {
        Some(session) => ClaimFields::Session {
            session_id: felt_field("session id", session)?,
            amount,
        },
        None => ClaimFields::Penalty {
            pool_key: batch.pool_key,
            amount,
        },
    })
}

/// Sign a voucher and attach the inclusion proof for every participant.
fn claim_records(
    batch: &PoolBatch,
    signer: &OutcomeSigner,
    expiry: u64,
    processed_at: u64,
) -> Result<Vec<ClaimRecord>, ProcessError> {
    batch
        .participants
        .iter()
        .map(|participant| -> Result<ClaimRecord, ProcessError> {
            let identity_key = participant.identity_key();
            let proof = batch
                .commitment
                .proof(&identity_key)
                .ok_or_else(|| MerkleError::MissingProof(identity_key.clone()))?;
            let user = felt_field("address", &participant.address)?;
            let voucher = signer.sign_claim(&user, &claim_fields(batch, participant)?, expiry)?;

            Ok(ClaimRecord {
                record_id: participant.record_id.clone(),
                kind: batch.kind,
                pool_key: batch.pool_key,
                address: participant.address.clone(),
                session_id: participant.session_id().map(str::to_string),
                reward: batch.reward_for(participant),
                message_hash: felt_to_hex(&voucher.message_hash),
                signature_r: felt_to_hex(&voucher.r),
                signature_s: felt_to_hex(&voucher.s),
                public_key: felt_to_hex(&voucher.public_key),
                proof: proof_to_hex(proof),
                expiry,
                processed_at,
                identity_key,
            })
        })
        .collect()
}
