//! Pool batch: validates participants, computes rewards and builds the
//! Merkle commitment over every participant.

use num_bigint::BigUint;
use stakepool_core::numeric::felt_to_hex;
use stakepool_core::{Participant, PoolKey, PoolKind, PoolSummary};
use stakepool_merkle::{build_commitment, build_leaves, MerkleCommitment, MerkleLeaf};
use stakepool_settlement::{aggregate_by_address, calculate, validate_participants, RewardCalculation};
use tracing::info;

use crate::ProcessError;

/// Everything computed for one pool before anything leaves the process.
#[derive(Debug, Clone)]
pub struct PoolBatch {
    pub kind: PoolKind,
    pub pool_key: PoolKey,
    pub participants: Vec<Participant>,
    pub calculation: RewardCalculation,
    pub leaves: Vec<MerkleLeaf>,
    pub commitment: MerkleCommitment,
}

impl PoolBatch {
    /// Validate, calculate and commit. Pure; the first violation aborts.
    pub fn build(kind: PoolKind, pool_key: PoolKey, participants: Vec<Participant>) -> Result<Self, ProcessError> {
        validate_participants(kind, &participants)?;

        let calculation = calculate(kind, &participants);
        let leaves = build_leaves(&participants, &calculation.shares)?;
        let commitment = build_commitment(&leaves)?;

        info!(
            %kind,
            day = pool_key.day,
            period = pool_key.period,
            participants = participants.len(),
            winners = calculation.winner_count(),
            root = %felt_to_hex(&commitment.root),
            "built pool commitment"
        );

        Ok(Self {
            kind,
            pool_key,
            participants,
            calculation,
            leaves,
            commitment,
        })
    }

    /// Reward committed in `participant`'s leaf.
    pub fn reward_for(&self, participant: &Participant) -> BigUint {
        match self.kind {
            PoolKind::Penalty => aggregate_by_address(&self.calculation.shares, &participant.address),
            PoolKind::Session => {
                let key = participant.identity_key();
                self.calculation
                    .shares
                    .iter()
                    .filter(|s| s.identity_key() == key)
                    .map(|s| &s.amount)
                    .sum()
            }
        }
    }

    pub fn summary(&self, transaction_hash: Option<String>) -> PoolSummary {
        PoolSummary {
            kind: self.kind,
            pool_key: self.pool_key,
            root: felt_to_hex(&self.commitment.root),
            participant_count: self.participants.len(),
            winner_count: self.calculation.winner_count(),
            total_stake: self.calculation.total_stake.clone(),
            total_slashed: self.calculation.total_slashed.clone(),
            protocol_fee: self.calculation.protocol_fee.clone(),
            net_reward_pool: self.calculation.net_reward_pool.clone(),
            total_distributed: self.calculation.total_distributed(),
            resumed: transaction_hash.is_none(),
            transaction_hash,
        }
    }
}
