use super::*;
use num_bigint::BigUint;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use stakepool_core::hash::{hash_many, hash_sorted_pair};
use stakepool_core::{Felt, Outcome, Participant, RewardShare};

fn leaf(key: &str, value: u64) -> MerkleLeaf {
    MerkleLeaf {
        identity_key: key.to_string(),
        hash: hash_many(&[Felt::from(value)]),
    }
}

fn make_leaves(count: usize) -> Vec<MerkleLeaf> {
    (0..count)
        .map(|i| leaf(&format!("0x{:x}", i + 1), i as u64 + 1))
        .collect()
}

fn assert_all_proofs_verify(leaves: &[MerkleLeaf], commitment: &MerkleCommitment) {
    assert_eq!(commitment.leaf_count(), leaves.len());
    for l in leaves {
        let proof = commitment.proof(&l.identity_key).expect("every leaf has a proof");
        assert!(
            verify_proof(l.hash, proof, commitment.root),
            "proof for {} does not fold to the root",
            l.identity_key
        );
    }
}

fn penalty(address: &str, stake: u64, level: u32) -> Participant {
    Participant {
        record_id: format!("rec-{address}"),
        address: address.to_string(),
        stake: BigUint::from(stake),
        outcome: Outcome::Penalty { level },
    }
}

#[test]
fn test_empty_commitment() {
    let c1 = build_commitment(&[]).unwrap();
    let c2 = build_commitment(&[]).unwrap();
    assert_eq!(c1.root, c2.root);
    assert_eq!(c1.root, empty_root());
    assert_ne!(c1.root, Felt::ZERO);
    assert!(c1.proofs.is_empty());
}

#[test]
fn test_single_leaf() {
    let leaves = make_leaves(1);
    let c = build_commitment(&leaves).unwrap();
    assert_eq!(c.root, leaves[0].hash);
    assert_eq!(c.proof("0x1"), Some(&[][..]));
}

#[test]
fn test_two_leaves() {
    let leaves = make_leaves(2);
    let c = build_commitment(&leaves).unwrap();
    assert_eq!(c.root, hash_sorted_pair(leaves[0].hash, leaves[1].hash));
    assert_eq!(c.proof("0x1").unwrap(), &[leaves[1].hash]);
    assert_eq!(c.proof("0x2").unwrap(), &[leaves[0].hash]);
}

#[test]
fn test_three_leaves_duplicates_last_node() {
    let leaves = make_leaves(3);
    let c = build_commitment(&leaves).unwrap();
    assert_all_proofs_verify(&leaves, &c);

    // Recompute the expected root with the odd node paired with itself.
    let mut hashes: Vec<Felt> = leaves.iter().map(|l| l.hash).collect();
    hashes.sort_by_key(|h| h.to_bytes_be());
    let left = hash_sorted_pair(hashes[0], hashes[1]);
    let right = hash_sorted_pair(hashes[2], hashes[2]);
    assert_eq!(c.root, hash_sorted_pair(left, right));

    // Hashing against zero would give something else.
    let zero_padded = hash_sorted_pair(left, hash_sorted_pair(hashes[2], Felt::ZERO));
    assert_ne!(c.root, zero_padded);
}

#[test]
fn test_proofs_verify_for_many_sizes() {
    for n in [2usize, 4, 5, 7, 8, 13, 32, 33] {
        let leaves = make_leaves(n);
        let c = build_commitment(&leaves).unwrap();
        assert_all_proofs_verify(&leaves, &c);
    }
}

#[test]
fn test_root_is_independent_of_input_order() {
    let leaves = make_leaves(11);
    let expected = build_commitment(&leaves).unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for _ in 0..5 {
        let mut shuffled = leaves.clone();
        shuffled.shuffle(&mut rng);
        let c = build_commitment(&shuffled).unwrap();
        assert_eq!(c.root, expected.root);
        assert_eq!(c.proofs, expected.proofs);
    }
}

#[test]
fn test_duplicate_identity_rejected() {
    let leaves = vec![leaf("0xa", 1), leaf("0xa", 2)];
    assert_eq!(
        build_commitment(&leaves),
        Err(MerkleError::DuplicateKey("0xa".into()))
    );
}

#[test]
fn test_tampered_proof_fails() {
    let leaves = make_leaves(5);
    let c = build_commitment(&leaves).unwrap();
    let mut proof = c.proof("0x3").unwrap().to_vec();
    proof[0] = Felt::from(12345u64);
    assert!(!verify_proof(leaves[2].hash, &proof, c.root));
}

#[test]
fn test_penalty_leaf_hash_layout() {
    let address = Felt::from(0xabcu64);
    let reward = (BigUint::from(2u32) << 128usize) + BigUint::from(5u32);
    let hash = penalty_leaf_hash(&address, &reward).unwrap();
    assert_eq!(hash, hash_many(&[address, Felt::from(5u64), Felt::from(2u64)]));
}

#[test]
fn test_session_leaf_hash_layout() {
    let address = Felt::from(0xabcu64);
    let session = Felt::from(9u64);
    let hash = session_leaf_hash(&address, &session, &BigUint::from(7u32)).unwrap();
    assert_eq!(hash, hash_many(&[address, session, Felt::from(7u64), Felt::ZERO]));
}

#[test]
fn test_build_leaves_includes_zero_reward_losers() {
    let participants = vec![penalty("0x1", 100, 0), penalty("0x2", 100, 1), penalty("0x3", 100, 3)];
    let shares = vec![RewardShare {
        address: "0x1".into(),
        session_id: None,
        amount: BigUint::from(108u32),
        weight: None,
    }];

    let leaves = build_leaves(&participants, &shares).unwrap();
    assert_eq!(leaves.len(), 3);
    assert_eq!(
        leaves[0].hash,
        penalty_leaf_hash(&Felt::from(1u64), &BigUint::from(108u32)).unwrap()
    );
    assert_eq!(
        leaves[2].hash,
        penalty_leaf_hash(&Felt::from(3u64), &BigUint::default()).unwrap()
    );

    let c = build_commitment(&leaves).unwrap();
    assert_all_proofs_verify(&leaves, &c);
}

#[test]
fn test_root_rederivable_from_stored_leaf_data() {
    let participants = vec![penalty("0x1", 10, 0), penalty("0x2", 10, 2)];
    let shares = vec![RewardShare {
        address: "0x1".into(),
        session_id: None,
        amount: BigUint::from(4u32),
        weight: None,
    }];
    let original = build_commitment(&build_leaves(&participants, &shares).unwrap()).unwrap();

    // An auditor only has (address, reward) rows.
    let stored = [("0x2", 0u32), ("0x1", 4u32)];
    let rebuilt: Vec<MerkleLeaf> = stored
        .iter()
        .map(|(address, reward)| MerkleLeaf {
            identity_key: address.to_string(),
            hash: penalty_leaf_hash(&Felt::from_hex(address).unwrap(), &BigUint::from(*reward)).unwrap(),
        })
        .collect();
    assert_eq!(build_commitment(&rebuilt).unwrap().root, original.root);
}

#[test]
fn test_proof_hex_round_trip() {
    let leaves = make_leaves(4);
    let c = build_commitment(&leaves).unwrap();
    let proof = c.proof("0x2").unwrap();
    let encoded = proof_to_hex(proof);
    assert!(encoded.iter().all(|s| s.starts_with("0x")));
    assert_eq!(proof_from_hex(&encoded).unwrap(), proof);
}
