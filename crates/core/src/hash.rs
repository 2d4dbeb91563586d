//! The ledger's native hash: Poseidon over ordered lists of field elements.
//!
//! Commitments and vouchers must be reproducible bit-for-bit by the on-chain
//! verifier, so every hash in the system goes through this module.

use starknet_crypto::poseidon_hash_many;

pub use starknet_crypto::Felt;

/// `H(elements...)`.
pub fn hash_many(elements: &[Felt]) -> Felt {
    poseidon_hash_many(elements)
}

/// Numeric ordering of two field elements, `(min, max)`.
pub fn sort_pair(a: Felt, b: Felt) -> (Felt, Felt) {
    // Big-endian bytes compare the same way the integers do.
    if a.to_bytes_be() <= b.to_bytes_be() {
        (a, b)
    } else {
        (b, a)
    }
}

/// `H(min(a, b), max(a, b))`, independent of tree position.
pub fn hash_sorted_pair(a: Felt, b: Felt) -> Felt {
    let (lo, hi) = sort_pair(a, b);
    hash_many(&[lo, hi])
}
