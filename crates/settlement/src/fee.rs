//! Protocol fee constants and calculation helpers.
//!
//! The fee is taken from the slashed pool before anything is distributed
//! to winners. The rate is fixed; it is not configurable per run.

use num_bigint::BigUint;

/// Protocol fee in percent of the slashed pool (10%).
pub const PROTOCOL_FEE_PERCENT: u32 = 10;

/// Percent denominator.
pub const PERCENT_DENOMINATOR: u32 = 100;

/// `floor(pool * 10 / 100)`.
pub fn protocol_fee(pool: &BigUint) -> BigUint {
    pool * PROTOCOL_FEE_PERCENT / PERCENT_DENOMINATOR
}

/// Split a slashed pool into `(fee, net_reward_pool)`.
pub fn split_reward_pool(pool: &BigUint) -> (BigUint, BigUint) {
    let fee = protocol_fee(pool);
    let net = pool - &fee;
    (fee, net)
}
