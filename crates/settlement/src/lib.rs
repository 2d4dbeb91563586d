//! StakePool Settlement
//!
//! Reward calculation for a single pool run: stake slashing, the protocol
//! fee split, proportional and weighted distribution, and the validation
//! pass that guards them. Also builds the ledger calls that publish and
//! read back a pool's commitment root.
//!
//! Everything here is pure; no I/O happens in this crate.

pub mod distribution;
pub mod fee;
pub mod instruction;
pub mod slash;
pub mod state;
pub mod validate;

pub use distribution::{
    aggregate_by_address, calculate, proportional_shares, weighted_shares, RewardCalculation,
};
pub use fee::*;
pub use slash::{stake_return, total_slashed};
pub use validate::{validate_participants, ValidationError};
