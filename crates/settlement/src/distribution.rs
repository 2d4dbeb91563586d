//! Reward distribution over a pool's winners.
//!
//! Proportional mode (penalty pools): winners are participants with penalty
//! level 0, weighted by stake. Weighted mode (session pools): winners are
//! completed sessions, weighted by `stake * duration`, one share per session.

use num_bigint::BigUint;
use num_traits::Zero;
use stakepool_core::numeric::canonical_felt_hex;
use stakepool_core::{Outcome, Participant, PoolKind, RewardShare};
use tracing::debug;

use crate::fee::split_reward_pool;
use crate::slash::total_slashed;

/// Everything the calculator derives for one pool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardCalculation {
    pub total_stake: BigUint,
    pub total_slashed: BigUint,
    pub protocol_fee: BigUint,
    pub net_reward_pool: BigUint,
    pub shares: Vec<RewardShare>,
}

impl RewardCalculation {
    pub fn total_distributed(&self) -> BigUint {
        self.shares.iter().map(|s| &s.amount).sum()
    }

    pub fn winner_count(&self) -> usize {
        self.shares.len()
    }
}

/// Slash, take the protocol fee and distribute for a pool of `kind`.
pub fn calculate(kind: PoolKind, participants: &[Participant]) -> RewardCalculation {
    let total_stake: BigUint = participants.iter().map(|p| &p.stake).sum();
    let slashed = total_slashed(participants);
    let (protocol_fee, net_reward_pool) = split_reward_pool(&slashed);

    let shares = match kind {
        PoolKind::Penalty => proportional_shares(participants, &net_reward_pool),
        PoolKind::Session => weighted_shares(participants, &net_reward_pool),
    };

    debug!(
        %kind,
        participants = participants.len(),
        total_slashed = %slashed,
        protocol_fee = %protocol_fee,
        net_reward_pool = %net_reward_pool,
        winners = shares.len(),
        "rewards calculated"
    );

    RewardCalculation {
        total_stake,
        total_slashed: slashed,
        protocol_fee,
        net_reward_pool,
        shares,
    }
}

/// Stake-proportional shares for participants with penalty level 0.
pub fn proportional_shares(participants: &[Participant], net_reward_pool: &BigUint) -> Vec<RewardShare> {
    let winners: Vec<&Participant> = participants
        .iter()
        .filter(|p| p.penalty_level() == 0)
        .collect();
    if winners.is_empty() || net_reward_pool.is_zero() {
        return Vec::new();
    }

    let total_winner_stake: BigUint = winners.iter().map(|p| &p.stake).sum();
    if total_winner_stake.is_zero() {
        return Vec::new();
    }

    winners
        .into_iter()
        .map(|p| RewardShare {
            address: p.address.clone(),
            session_id: None,
            amount: net_reward_pool * &p.stake / &total_winner_stake,
            weight: None,
        })
        .collect()
}

/// `stake * duration` weighted shares, one per completed session.
pub fn weighted_shares(participants: &[Participant], net_reward_pool: &BigUint) -> Vec<RewardShare> {
    let winners: Vec<(&Participant, &str, BigUint)> = participants
        .iter()
        .filter_map(|p| match &p.outcome {
            Outcome::Session {
                completed: true,
                duration,
                session_id,
            } => Some((p, session_id.as_str(), &p.stake * *duration)),
            _ => None,
        })
        .collect();
    if winners.is_empty() || net_reward_pool.is_zero() {
        return Vec::new();
    }

    let total_weight: BigUint = winners.iter().map(|(_, _, w)| w).sum();
    if total_weight.is_zero() {
        return Vec::new();
    }

    winners
        .into_iter()
        .map(|(p, session_id, weight)| RewardShare {
            address: p.address.clone(),
            session_id: Some(session_id.to_string()),
            amount: net_reward_pool * &weight / &total_weight,
            weight: Some(weight),
        })
        .collect()
}

/// Sum of every share paid to `address`, across all of its units.
pub fn aggregate_by_address(shares: &[RewardShare], address: &str) -> BigUint {
    let wanted = canonical_felt_hex(address);
    shares
        .iter()
        .filter(|s| canonical_felt_hex(&s.address) == wanted)
        .map(|s| &s.amount)
        .sum()
}
