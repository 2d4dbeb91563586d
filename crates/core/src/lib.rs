//! StakePool Core
//!
//! Generic types, errors, and primitives shared by every distributor crate:
//! pool keys and timing, participants, reward shares, processing results,
//! fixed-point helpers and the ledger's native field hash.

pub mod hash;
pub mod numeric;
mod pool;

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hash::Felt;
pub use pool::{PoolKey, MAX_DAY, PERIOD_SECONDS, READY_DELAY_SECS, SECONDS_PER_DAY};

/// Error types shared across all crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid period {0}: must be 0 or 1")]
    InvalidPeriod(u8),
    #[error("invalid pool key: {0}")]
    InvalidPoolKey(String),
    #[error("unknown pool kind: {0}")]
    UnknownPoolKind(String),
}

/// The two pool flavours the distributor settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Outcome is a penalty (snooze) count; rewards are stake-proportional.
    Penalty,
    /// Outcome is a completed/failed session; rewards are weighted by stake * duration.
    Session,
}

impl PoolKind {
    pub const ALL: [PoolKind; 2] = [PoolKind::Penalty, PoolKind::Session];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Penalty => "penalty",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PoolKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "penalty" => Ok(Self::Penalty),
            "session" => Ok(Self::Session),
            other => Err(CoreError::UnknownPoolKind(other.to_string())),
        }
    }
}

/// Penalty level at which the whole stake is forfeited.
pub const FORFEIT_LEVEL: u32 = 3;

/// Pool-kind specific outcome carried by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Penalty {
        level: u32,
    },
    Session {
        completed: bool,
        duration: u64,
        session_id: String,
    },
}

impl Outcome {
    pub fn kind(&self) -> PoolKind {
        match self {
            Self::Penalty { .. } => PoolKind::Penalty,
            Self::Session { .. } => PoolKind::Session,
        }
    }
}

/// One pool member, as read from storage for a single processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Storage primary key. Never generated here.
    pub record_id: String,
    /// Wallet address, `0x`-prefixed hex.
    pub address: String,
    pub stake: BigUint,
    pub outcome: Outcome,
}

impl Participant {
    /// Slashing level. Failed sessions forfeit everything, completed ones nothing.
    pub fn penalty_level(&self) -> u32 {
        match &self.outcome {
            Outcome::Penalty { level } => *level,
            Outcome::Session { completed: true, .. } => 0,
            Outcome::Session { completed: false, .. } => FORFEIT_LEVEL,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Session { session_id, .. } => Some(session_id),
            Outcome::Penalty { .. } => None,
        }
    }

    /// Key identifying this participant's leaf in the commitment.
    pub fn identity_key(&self) -> String {
        identity_key(&self.address, self.session_id())
    }
}

/// `address` for address-keyed pools, `address:session` for session pools.
pub fn identity_key(address: &str, session_id: Option<&str>) -> String {
    let address = numeric::canonical_felt_hex(address);
    match session_id {
        Some(session) => format!("{}:{}", address, numeric::canonical_felt_hex(session)),
        None => address,
    }
}

/// A computed payout for one winning unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardShare {
    pub address: String,
    pub session_id: Option<String>,
    pub amount: BigUint,
    pub weight: Option<BigUint>,
}

impl RewardShare {
    pub fn identity_key(&self) -> String {
        identity_key(&self.address, self.session_id.as_deref())
    }
}

/// Summary of a pool that reached `DONE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub kind: PoolKind,
    pub pool_key: PoolKey,
    /// Commitment root, canonical hex.
    pub root: String,
    pub participant_count: usize,
    pub winner_count: usize,
    #[serde(with = "numeric::decimal")]
    pub total_stake: BigUint,
    #[serde(with = "numeric::decimal")]
    pub total_slashed: BigUint,
    #[serde(with = "numeric::decimal")]
    pub protocol_fee: BigUint,
    #[serde(with = "numeric::decimal")]
    pub net_reward_pool: BigUint,
    #[serde(with = "numeric::decimal")]
    pub total_distributed: BigUint,
    pub transaction_hash: Option<String>,
    /// The root was already on-chain and publication was skipped.
    pub resumed: bool,
}

/// Per-pool result handed back to callers. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub summary: Option<PoolSummary>,
    pub transaction_hash: Option<String>,
    pub message: Option<String>,
}
