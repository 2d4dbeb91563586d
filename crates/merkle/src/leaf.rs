use std::collections::HashMap;

use num_bigint::BigUint;
use stakepool_core::hash::hash_many;
use stakepool_core::numeric::{parse_felt, split_wide};
use stakepool_core::{Felt, Participant, RewardShare};

use crate::MerkleError;

/// A leaf of the payout tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleLeaf {
    /// Unique per leaf: address, or `address:session` for session pools.
    pub identity_key: String,
    pub hash: Felt,
}

/// `H(address, reward_low, reward_high)`.
pub fn penalty_leaf_hash(address: &Felt, reward: &BigUint) -> Result<Felt, MerkleError> {
    let (low, high) = split_wide(reward)?;
    Ok(hash_many(&[*address, Felt::from(low), Felt::from(high)]))
}

/// `H(address, session_id, reward_low, reward_high)`.
pub fn session_leaf_hash(
    address: &Felt,
    session_id: &Felt,
    reward: &BigUint,
) -> Result<Felt, MerkleError> {
    let (low, high) = split_wide(reward)?;
    Ok(hash_many(&[*address, *session_id, Felt::from(low), Felt::from(high)]))
}

pub fn participant_leaf(participant: &Participant, reward: &BigUint) -> Result<MerkleLeaf, MerkleError> {
    let address = parse_felt(&participant.address).map_err(|_| MerkleError::InvalidField {
        field: "address",
        value: participant.address.clone(),
    })?;

    let hash = match participant.session_id() {
        Some(session) => {
            let session_id = parse_felt(session).map_err(|_| MerkleError::InvalidField {
                field: "session id",
                value: session.to_string(),
            })?;
            session_leaf_hash(&address, &session_id, reward)?
        }
        None => penalty_leaf_hash(&address, reward)?,
    };

    Ok(MerkleLeaf {
        identity_key: participant.identity_key(),
        hash,
    })
}

/// One leaf per participant; the reward is looked up by identity key and is
/// zero for anyone without a share.
pub fn build_leaves(participants: &[Participant], shares: &[RewardShare]) -> Result<Vec<MerkleLeaf>, MerkleError> {
    let mut rewards: HashMap<String, BigUint> = HashMap::with_capacity(shares.len());
    for share in shares {
        *rewards.entry(share.identity_key()).or_default() += &share.amount;
    }

    let zero = BigUint::default();
    participants
        .iter()
        .map(|p| {
            let reward = rewards.get(&p.identity_key()).unwrap_or(&zero);
            participant_leaf(p, reward)
        })
        .collect()
}
