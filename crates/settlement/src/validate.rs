//! Side-effect-free validation pass run before any calculation.

use std::collections::HashSet;

use stakepool_core::numeric::{fits_u256, parse_felt};
use stakepool_core::{Participant, PoolKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("participant {0} has an empty address")]
    EmptyAddress(String),
    #[error("participant {record_id} address {address:?} is not 0x-prefixed")]
    MissingPrefix { record_id: String, address: String },
    #[error("participant {record_id} address {address:?} is not a field element")]
    InvalidAddress { record_id: String, address: String },
    #[error("participant {0} stake exceeds 2^256 - 1")]
    StakeOverflow(String),
    #[error("participant {record_id} is not a {expected} pool record")]
    KindMismatch { record_id: String, expected: PoolKind },
    #[error("participant {record_id} session id {session_id:?} is not a field element")]
    InvalidSessionId { record_id: String, session_id: String },
    #[error("duplicate leaf identity {0}")]
    DuplicateIdentity(String),
}

/// Check every participant of a `kind` pool; the first violation aborts the run.
pub fn validate_participants(kind: PoolKind, participants: &[Participant]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(participants.len());

    for p in participants {
        if p.address.is_empty() {
            return Err(ValidationError::EmptyAddress(p.record_id.clone()));
        }
        if !p.address.starts_with("0x") && !p.address.starts_with("0X") {
            return Err(ValidationError::MissingPrefix {
                record_id: p.record_id.clone(),
                address: p.address.clone(),
            });
        }
        if parse_felt(&p.address).is_err() {
            return Err(ValidationError::InvalidAddress {
                record_id: p.record_id.clone(),
                address: p.address.clone(),
            });
        }
        if !fits_u256(&p.stake) {
            return Err(ValidationError::StakeOverflow(p.record_id.clone()));
        }
        if p.outcome.kind() != kind {
            return Err(ValidationError::KindMismatch {
                record_id: p.record_id.clone(),
                expected: kind,
            });
        }
        if let Some(session_id) = p.session_id() {
            if parse_felt(session_id).is_err() {
                return Err(ValidationError::InvalidSessionId {
                    record_id: p.record_id.clone(),
                    session_id: session_id.to_string(),
                });
            }
        }

        let key = p.identity_key();
        if !seen.insert(key.clone()) {
            return Err(ValidationError::DuplicateIdentity(key));
        }
    }

    Ok(())
}
