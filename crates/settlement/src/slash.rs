//! Stake slashing.

use num_bigint::BigUint;
use stakepool_core::Participant;

/// Returned stake for a penalty level: 100%, 80%, 50%, then nothing.
///
/// Floor division throughout; the dust stays in the slashed pool.
pub fn stake_return(stake: &BigUint, penalty_level: u32) -> BigUint {
    match penalty_level {
        0 => stake.clone(),
        1 => stake * 80u32 / 100u32,
        2 => stake * 50u32 / 100u32,
        _ => BigUint::default(),
    }
}

/// `Σ (stake - stake_return(stake, level))`.
pub fn total_slashed(participants: &[Participant]) -> BigUint {
    participants
        .iter()
        .map(|p| &p.stake - stake_return(&p.stake, p.penalty_level()))
        .sum()
}
