//! Merkle commitments over a pool's payouts.
//!
//! Every participant, winner or not, becomes a leaf so that each can prove
//! their (possibly zero) entitlement against the root published on-chain.
//! Internal nodes hash their children in numeric order, so proofs carry no
//! left/right position bits.

mod leaf;
mod tree;

use stakepool_core::numeric::NumericError;
use thiserror::Error;

pub use leaf::{build_leaves, participant_leaf, penalty_leaf_hash, session_leaf_hash, MerkleLeaf};
pub use tree::{
    build_commitment, empty_root, fold_proof, proof_from_hex, proof_to_hex, verify_proof,
    MerkleCommitment, EMPTY_TREE_SENTINEL,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("duplicate leaf identity: {0}")]
    DuplicateKey(String),
    #[error("reward amount out of range: {0}")]
    Amount(#[from] NumericError),
    #[error("invalid {field} {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("no proof for leaf {0}")]
    MissingProof(String),
}

#[cfg(test)]
mod tests;
