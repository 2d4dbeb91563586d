use std::collections::{BTreeMap, HashSet};

use stakepool_core::hash::{hash_many, hash_sorted_pair};
use stakepool_core::numeric::{felt_to_hex, parse_felt, NumericError};
use stakepool_core::Felt;

use crate::{MerkleError, MerkleLeaf};

/// Hashed to produce the root of a tree with no leaves.
pub const EMPTY_TREE_SENTINEL: Felt = Felt::ZERO;

/// Root plus one inclusion proof per leaf identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleCommitment {
    pub root: Felt,
    /// Sibling hashes, leaf level first.
    pub proofs: BTreeMap<String, Vec<Felt>>,
}

impl MerkleCommitment {
    pub fn proof(&self, identity_key: &str) -> Option<&[Felt]> {
        self.proofs.get(identity_key).map(Vec::as_slice)
    }

    pub fn leaf_count(&self) -> usize {
        self.proofs.len()
    }
}

struct Node {
    hash: Felt,
    /// Indices of the leaves under this node.
    leaves: Vec<usize>,
}

/// Deterministic non-zero root used when a pool has no participants.
pub fn empty_root() -> Felt {
    hash_many(&[EMPTY_TREE_SENTINEL])
}

/// Build the commitment for `leaves`.
///
/// Leaves are ordered by hash before pairing, so the root does not depend on
/// input order. Odd levels pair the last node with itself.
pub fn build_commitment(leaves: &[MerkleLeaf]) -> Result<MerkleCommitment, MerkleError> {
    let mut seen = HashSet::with_capacity(leaves.len());
    for leaf in leaves {
        if !seen.insert(leaf.identity_key.as_str()) {
            return Err(MerkleError::DuplicateKey(leaf.identity_key.clone()));
        }
    }

    if leaves.is_empty() {
        return Ok(MerkleCommitment {
            root: empty_root(),
            proofs: BTreeMap::new(),
        });
    }

    let mut ordered: Vec<&MerkleLeaf> = leaves.iter().collect();
    ordered.sort_by(|a, b| {
        a.hash
            .to_bytes_be()
            .cmp(&b.hash.to_bytes_be())
            .then_with(|| a.identity_key.cmp(&b.identity_key))
    });

    let mut proofs: Vec<Vec<Felt>> = vec![Vec::new(); ordered.len()];
    let mut level: Vec<Node> = ordered
        .iter()
        .enumerate()
        .map(|(i, leaf)| Node {
            hash: leaf.hash,
            leaves: vec![i],
        })
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();

        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => {
                    for &i in &left.leaves {
                        proofs[i].push(right.hash);
                    }
                    for &i in &right.leaves {
                        proofs[i].push(left.hash);
                    }
                    let mut under = left.leaves;
                    under.extend(right.leaves);
                    next.push(Node {
                        hash: hash_sorted_pair(left.hash, right.hash),
                        leaves: under,
                    });
                }
                None => {
                    // Duplicate the odd node; its own hash is the sibling.
                    for &i in &left.leaves {
                        proofs[i].push(left.hash);
                    }
                    next.push(Node {
                        hash: hash_sorted_pair(left.hash, left.hash),
                        leaves: left.leaves,
                    });
                }
            }
        }

        level = next;
    }

    let root = level[0].hash;
    let proofs = ordered
        .iter()
        .zip(proofs)
        .map(|(leaf, proof)| (leaf.identity_key.clone(), proof))
        .collect();

    Ok(MerkleCommitment { root, proofs })
}

/// Fold a proof from the leaf hash up, hashing each step in sorted order.
pub fn fold_proof(leaf_hash: Felt, proof: &[Felt]) -> Felt {
    proof
        .iter()
        .fold(leaf_hash, |acc, sibling| hash_sorted_pair(acc, *sibling))
}

pub fn verify_proof(leaf_hash: Felt, proof: &[Felt], root: Felt) -> bool {
    fold_proof(leaf_hash, proof) == root
}

/// Serialized proof form stored alongside a claim.
pub fn proof_to_hex(proof: &[Felt]) -> Vec<String> {
    proof.iter().map(felt_to_hex).collect()
}

pub fn proof_from_hex(proof: &[String]) -> Result<Vec<Felt>, NumericError> {
    proof.iter().map(|s| parse_felt(s)).collect()
}
