//! Integration tests for the aggregator pipeline.

use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use stakepool_core::numeric::parse_felt;
use stakepool_core::{Felt, Outcome, Participant, PoolKey, PoolKind};
use stakepool_crypto::{verify_signature, ClaimFields, ClaimSignature, Domain, OutcomeSigner, SigningKeypair};
use stakepool_merkle::{penalty_leaf_hash, proof_from_hex, session_leaf_hash, verify_proof};

use crate::poster::{DryRunLedger, LedgerError, RootPublisher};
use crate::processor::{PoolKindConfig, PoolOutcome, PoolProcessor, PoolSetup, SkipReason};
use crate::service::{AggregatorConfig, AggregatorService};
use crate::sqlite::SqliteStore;
use crate::store::{MemoryStore, ParticipantStore, StoreObj};
use crate::ProcessError;

const PENALTY_CONTRACT: Felt = Felt::from_hex_unchecked("0x9e0a1");
const SESSION_CONTRACT: Felt = Felt::from_hex_unchecked("0x5e55");

fn key() -> PoolKey {
    PoolKey::new(20_000, 0).unwrap()
}

fn ready_now() -> u64 {
    key().ready_time() + 60
}

fn signer(secret: &str) -> OutcomeSigner {
    OutcomeSigner::new(
        SigningKeypair::from_secret_hex(secret).unwrap(),
        Domain::new("SN_SEPOLIA").unwrap(),
    )
}

fn penalty(id: &str, address: &str, stake: u64, level: u32) -> Participant {
    Participant {
        record_id: id.into(),
        address: address.into(),
        stake: BigUint::from(stake),
        outcome: Outcome::Penalty { level },
    }
}

fn session(id: &str, session_id: &str, completed: bool, duration: u64) -> Participant {
    Participant {
        record_id: id.into(),
        address: "0xbeef".into(),
        stake: BigUint::from(100u32),
        outcome: Outcome::Session {
            completed,
            duration,
            session_id: session_id.into(),
        },
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    ledger: Arc<DryRunLedger>,
    processor: PoolProcessor,
}

fn processor_for(store: StoreObj, ledger: Arc<DryRunLedger>, now: u64) -> PoolProcessor {
    let publisher = RootPublisher::new(ledger, Duration::from_millis(50));
    PoolProcessor::new(store, publisher)
        .with_pool(
            PoolKind::Penalty,
            PoolSetup::Configured(PoolKindConfig {
                contract_address: PENALTY_CONTRACT,
                signer: signer("0x1111"),
            }),
        )
        .with_pool(
            PoolKind::Session,
            PoolSetup::Configured(PoolKindConfig {
                contract_address: SESSION_CONTRACT,
                signer: signer("0x2222"),
            }),
        )
        .with_clock(Arc::new(move || now))
}

fn harness(now: u64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(DryRunLedger::new());
    let processor = processor_for(store.clone(), ledger.clone(), now);
    Harness {
        store,
        ledger,
        processor,
    }
}

fn seed_three(store: &MemoryStore) {
    store.insert_participant(PoolKind::Penalty, key(), penalty("r1", "0x1", 100, 0));
    store.insert_participant(PoolKind::Penalty, key(), penalty("r2", "0x2", 100, 1));
    store.insert_participant(PoolKind::Penalty, key(), penalty("r3", "0x3", 100, 3));
}

fn assert_nothing_persisted(h: &Harness) {
    assert_eq!(h.store.write_count(), 0);
    assert!(h.store.claims().is_empty());
    assert_eq!(h.store.participant_state("r1"), Some((None, false)));
}

#[tokio::test]
async fn test_three_participant_pool_end_to_end() {
    let h = harness(ready_now());
    seed_three(&h.store);

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    let summary = match outcome {
        PoolOutcome::Done(summary) => summary,
        other => panic!("expected a finished pool, got {other:?}"),
    };

    assert_eq!(summary.participant_count, 3);
    assert_eq!(summary.winner_count, 1);
    assert_eq!(summary.total_stake, BigUint::from(300u32));
    assert_eq!(summary.total_slashed, BigUint::from(120u32));
    assert_eq!(summary.protocol_fee, BigUint::from(12u32));
    assert_eq!(summary.net_reward_pool, BigUint::from(108u32));
    assert_eq!(summary.total_distributed, BigUint::from(108u32));
    assert_eq!(summary.transaction_hash.as_deref(), Some("0x1"));
    assert!(!summary.resumed);
    assert_eq!(h.ledger.submission_count(), 1);

    let root = parse_felt(&summary.root).unwrap();
    let claims = h.store.claims();
    assert_eq!(claims.len(), 3);

    let expected = [("r1", 108u32), ("r2", 0), ("r3", 0)];
    let penalty_signer = signer("0x1111");
    for (claim, (record_id, reward)) in claims.iter().zip(expected) {
        assert_eq!(claim.record_id, record_id);
        assert_eq!(claim.reward, BigUint::from(reward));
        assert_eq!(claim.expiry, ready_now() + 172_800);
        assert_eq!(claim.processed_at, ready_now());

        // Proof folds to the published root from the stored (address, reward).
        let address = parse_felt(&claim.address).unwrap();
        let leaf = penalty_leaf_hash(&address, &claim.reward).unwrap();
        let proof = proof_from_hex(&claim.proof).unwrap();
        assert!(verify_proof(leaf, &proof, root), "proof for {record_id} must verify");

        // Voucher is bound to this user, pool and amount.
        let fields = ClaimFields::Penalty {
            pool_key: key(),
            amount: claim.reward.clone(),
        };
        let message_hash = penalty_signer.message_hash(&address, &fields, claim.expiry).unwrap();
        assert_eq!(parse_felt(&claim.message_hash).unwrap(), message_hash);
        let signature = ClaimSignature {
            r: parse_felt(&claim.signature_r).unwrap(),
            s: parse_felt(&claim.signature_s).unwrap(),
        };
        assert!(verify_signature(&penalty_signer.public_key(), &message_hash, &signature));

        let state = h.store.participant_state(record_id).unwrap();
        assert_eq!(state, (Some(BigUint::from(reward)), true));
    }
}

#[tokio::test]
async fn test_session_pool_end_to_end() {
    let h = harness(ready_now());
    h.store.insert_participant(PoolKind::Session, key(), session("s1", "0x1", true, 1));
    h.store.insert_participant(PoolKind::Session, key(), session("s2", "0x2", true, 3));
    h.store.insert_participant(PoolKind::Session, key(), session("s3", "0x3", false, 10));

    let outcome = h.processor.process_pool(PoolKind::Session, key(), false).await;
    let summary = match outcome {
        PoolOutcome::Done(summary) => summary,
        other => panic!("expected a finished pool, got {other:?}"),
    };
    assert_eq!(summary.winner_count, 2);
    assert_eq!(h.ledger.submissions()[0].contract_address, SESSION_CONTRACT);

    let root = parse_felt(&summary.root).unwrap();
    let rewards: Vec<u32> = vec![22, 67, 0];
    for (claim, reward) in h.store.claims().iter().zip(rewards) {
        assert_eq!(claim.reward, BigUint::from(reward));
        let session_id = parse_felt(claim.session_id.as_deref().unwrap()).unwrap();
        let leaf = session_leaf_hash(&parse_felt(&claim.address).unwrap(), &session_id, &claim.reward).unwrap();
        assert!(verify_proof(leaf, &proof_from_hex(&claim.proof).unwrap(), root));
        assert_eq!(claim.identity_key, format!("0xbeef:{}", claim.session_id.as_deref().unwrap()));
    }
}

#[tokio::test]
async fn test_submit_failure_writes_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.ledger.fail_submissions();

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(outcome, PoolOutcome::Failed(ProcessError::Ledger(LedgerError::Submit(_)))));
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_root_mismatch_writes_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    // Confirmed, but the contract reports a different root afterwards.
    h.ledger.override_root(Felt::from(0xdeadu64));

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Failed(ProcessError::Ledger(LedgerError::RootMismatch { .. }))
    ));
    assert_eq!(h.ledger.submission_count(), 1);
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_reverted_transaction_writes_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.ledger.revert_with("caller is not the owner");

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Failed(ProcessError::Ledger(LedgerError::Reverted { .. }))
    ));
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_confirmation_timeout_writes_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.ledger.hang_confirmations();

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Failed(ProcessError::Ledger(LedgerError::ConfirmationTimeout { .. }))
    ));
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_too_early_skips_unless_forced() {
    let now = key().ready_time() - 100;
    let h = harness(now);
    seed_three(&h.store);

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Skipped(SkipReason::TooEarly { remaining_secs: 100 })
    ));
    assert!(outcome.is_too_early());
    let result = outcome.into_result();
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("too early, pool is ready in 100s"));
    assert_eq!(h.ledger.submission_count(), 0);

    let forced = h.processor.process_pool(PoolKind::Penalty, key(), true).await;
    assert!(matches!(forced, PoolOutcome::Done(_)));
    assert_eq!(h.ledger.submission_count(), 1);
}

#[tokio::test]
async fn test_ready_exactly_at_ready_time() {
    let h = harness(key().ready_time());
    seed_three(&h.store);
    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(outcome, PoolOutcome::Done(_)));
}

#[tokio::test]
async fn test_empty_pool_is_skipped() {
    let h = harness(ready_now());
    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(outcome, PoolOutcome::Skipped(SkipReason::Empty)));
    assert_eq!(h.ledger.submission_count(), 0);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_validation_failure_touches_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.store.insert_participant(PoolKind::Penalty, key(), penalty("r4", "4444", 100, 0));

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(outcome, PoolOutcome::Failed(ProcessError::Validation(_))));
    assert_eq!(h.ledger.submission_count(), 0);
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_not_configured_fails_before_timing() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(DryRunLedger::new());
    let processor = PoolProcessor::new(store.clone(), RootPublisher::new(ledger.clone(), Duration::from_secs(1)))
        .with_pool(PoolKind::Session, PoolSetup::NotConfigured)
        .with_clock(Arc::new(|| 0u64));
    store.insert_participant(PoolKind::Session, key(), session("s1", "0x1", true, 1));

    let outcome = processor.process_pool(PoolKind::Session, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Failed(ProcessError::NotConfigured(PoolKind::Session))
    ));
    let result = outcome.into_result();
    assert!(!result.success);
    assert_eq!(ledger.submission_count(), 0);
}

#[tokio::test]
async fn test_resume_after_persistence_failure() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.store.fail_writes_after(0);

    let first = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(first, PoolOutcome::Failed(ProcessError::Storage(_))));
    assert_eq!(h.ledger.submission_count(), 1);
    assert!(h.store.claims().is_empty());

    h.store.clear_write_failures();
    let second = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    let summary = match second {
        PoolOutcome::Done(summary) => summary,
        other => panic!("expected the retry to finish, got {other:?}"),
    };
    assert!(summary.resumed);
    assert_eq!(summary.transaction_hash, None);
    assert_eq!(h.ledger.submission_count(), 1);
    assert_eq!(h.store.claims().len(), 3);
}

#[tokio::test]
async fn test_reprocessing_does_not_duplicate_claims() {
    let h = harness(ready_now());
    seed_three(&h.store);

    assert!(matches!(
        h.processor.process_pool(PoolKind::Penalty, key(), false).await,
        PoolOutcome::Done(_)
    ));
    assert!(matches!(
        h.processor.process_pool(PoolKind::Penalty, key(), true).await,
        PoolOutcome::Done(ref s) if s.resumed
    ));
    assert_eq!(h.store.claims().len(), 3);
    assert_eq!(h.ledger.submission_count(), 1);
}

#[tokio::test]
async fn test_foreign_root_conflict_writes_nothing() {
    let h = harness(ready_now());
    seed_three(&h.store);
    h.ledger.set_root(PENALTY_CONTRACT, key(), Felt::from(1u64));

    let outcome = h.processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(
        outcome,
        PoolOutcome::Failed(ProcessError::Ledger(LedgerError::RootConflict { .. }))
    ));
    assert_eq!(h.ledger.submission_count(), 0);
    assert_nothing_persisted(&h);
}

#[tokio::test]
async fn test_batch_isolates_failures_and_drops_stale_pools() {
    let old = PoolKey::new(20_000, 0).unwrap();
    let new = PoolKey::new(20_000, 1).unwrap();
    let stale = PoolKey::new(19_990, 0).unwrap();
    let now = new.ready_time() + 10;

    let h = harness(now);
    h.store.insert_participant(PoolKind::Penalty, new, penalty("n1", "0x1", 100, 0));
    h.store.insert_participant(PoolKind::Penalty, new, penalty("n2", "0x2", 100, 2));
    h.store.insert_participant(PoolKind::Penalty, old, penalty("o1", "not-hex", 100, 0));
    h.store.insert_participant(PoolKind::Penalty, stale, penalty("x1", "0x1", 100, 0));

    let service = AggregatorService::new(
        AggregatorConfig {
            inter_pool_delay: Duration::ZERO,
            ..AggregatorConfig::default()
        },
        h.processor,
    );
    let result = service.process_all_pools(&PoolKind::ALL, false).await.unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.outcomes[0].pool_key, old);
    assert!(matches!(result.outcomes[0].outcome, PoolOutcome::Failed(ProcessError::Validation(_))));
    assert_eq!(result.outcomes[1].pool_key, new);
    assert!(matches!(result.outcomes[1].outcome, PoolOutcome::Done(_)));
    assert_eq!(result.reasons().len(), 1);

    assert_eq!(h.store.participant_state("x1"), Some((None, false)));
    assert_eq!(h.store.participant_state("n1"), Some((Some(BigUint::from(45u32)), true)));
}

#[tokio::test(start_paused = true)]
async fn test_batch_waits_between_pools_only() {
    let first = PoolKey::new(20_000, 0).unwrap();
    let second = PoolKey::new(20_000, 1).unwrap();
    let h = harness(second.ready_time() + 10);
    h.store.insert_participant(PoolKind::Penalty, first, penalty("a1", "0x1", 100, 0));
    h.store.insert_participant(PoolKind::Penalty, second, penalty("b1", "0x2", 100, 0));

    let service = AggregatorService::new(AggregatorConfig::default(), h.processor);
    let started = tokio::time::Instant::now();
    let result = service.process_all_pools(&[PoolKind::Penalty], false).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.succeeded, 2);
    assert!(elapsed >= Duration::from_secs(3), "waited {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "waited {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_batch_single_pool_does_not_wait() {
    let h = harness(ready_now());
    seed_three(&h.store);

    let service = AggregatorService::new(AggregatorConfig::default(), h.processor);
    let started = tokio::time::Instant::now();
    let result = service.process_all_pools(&[PoolKind::Penalty], false).await.unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_batch_skips_unconfigured_kinds() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(DryRunLedger::new());
    let processor = PoolProcessor::new(store.clone(), RootPublisher::new(ledger, Duration::from_secs(1)))
        .with_clock(Arc::new(ready_now));
    store.insert_participant(PoolKind::Penalty, key(), penalty("r1", "0x1", 100, 0));

    let service = AggregatorService::new(AggregatorConfig::default(), processor);
    let result = service.process_all_pools(&PoolKind::ALL, false).await.unwrap();
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn test_find_latest_uses_clock() {
    let h = harness(key().ready_time());
    let service = AggregatorService::new(AggregatorConfig::default(), h.processor);
    assert_eq!(service.find_latest(), Some(key()));
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let db = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    for p in [penalty("r1", "0x1", 100, 0), penalty("r2", "0x2", 100, 1), penalty("r3", "0x3", 100, 3)] {
        db.insert_participant(PoolKind::Penalty, &key(), &p).await.unwrap();
    }

    let ledger = Arc::new(DryRunLedger::new());
    let processor = processor_for(db.clone(), ledger.clone(), ready_now());
    let outcome = processor.process_pool(PoolKind::Penalty, key(), false).await;
    assert!(matches!(outcome, PoolOutcome::Done(_)));

    let claims = db.fetch_claim_records(&key()).await.unwrap();
    assert_eq!(claims.len(), 3);
    assert_eq!(claims[0].reward, BigUint::from(108u32));
    assert!(db.fetch_unfinalized_pool_keys(PoolKind::Penalty).await.unwrap().is_empty());
}
