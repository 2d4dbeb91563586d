//! Decoding of on-chain pool state returned by view calls.

use stakepool_core::Felt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("expected {expected} return values, got {got}")]
    UnexpectedLength { expected: usize, got: usize },
}

/// Commitment root currently stored for a pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainRoot {
    /// The contract reports zero: nothing published yet.
    Unset,
    Set(Felt),
}

impl OnChainRoot {
    /// Decode the single-felt return of `get_merkle_root`.
    pub fn decode(values: &[Felt]) -> Result<Self, StateError> {
        match values {
            [root] if *root == Felt::ZERO => Ok(Self::Unset),
            [root] => Ok(Self::Set(*root)),
            _ => Err(StateError::UnexpectedLength {
                expected: 1,
                got: values.len(),
            }),
        }
    }

    pub fn matches(&self, root: &Felt) -> bool {
        matches!(self, Self::Set(stored) if stored == root)
    }
}
