//! Root publisher: submits `set_merkle_root` and proves it landed.
//!
//! Ledger access goes through the [`LedgerClient`] trait. [`StarknetLedger`]
//! talks JSON-RPC to a real node; [`DryRunLedger`] records submissions in
//! memory and can be scripted to fail, revert, hang or report a foreign root.
//!
//! [`StarknetLedger`]: crate::starknet_rpc::StarknetLedger

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stakepool_core::numeric::felt_to_hex;
use stakepool_core::{Felt, PoolKey};
use stakepool_settlement::instruction::{self, EntryPoint, LedgerCall};
use stakepool_settlement::state::{OnChainRoot, StateError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("transaction submission failed: {0}")]
    Submit(String),
    #[error("transaction {tx} reverted: {reason}")]
    Reverted { tx: String, reason: String },
    #[error("transaction {tx} not confirmed within {secs}s")]
    ConfirmationTimeout { tx: String, secs: u64 },
    #[error("on-chain root {actual} does not match computed root {expected}")]
    RootMismatch { expected: String, actual: String },
    #[error("pool already has root {existing}, refusing to overwrite with {computed}")]
    RootConflict { existing: String, computed: String },
    #[error("unexpected view result: {0}")]
    State(#[from] StateError),
}

/// Final execution status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Succeeded,
    Reverted(String),
}

/// Trait for the ledger collaborator. No retries happen above this layer.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the account that signs submissions.
    fn account_address(&self) -> Felt;

    async fn get_nonce(&self, account: &Felt) -> Result<Felt, LedgerError>;

    /// Submit an invoke and return its transaction hash.
    async fn submit(&self, call: &LedgerCall, nonce: Felt) -> Result<String, LedgerError>;

    /// Block until the transaction is executed.
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<TxStatus, LedgerError>;

    /// Evaluate a view call against the same state [`get_nonce`] sees. A
    /// transaction reported `Succeeded` by [`wait_for_confirmation`] must
    /// already be visible here.
    ///
    /// [`wait_for_confirmation`]: LedgerClient::wait_for_confirmation
    /// [`get_nonce`]: LedgerClient::get_nonce
    async fn read(&self, call: &LedgerCall) -> Result<Vec<Felt>, LedgerError>;
}

/// What [`RootPublisher::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// `None` when the root was already on-chain and nothing was submitted.
    pub transaction_hash: Option<String>,
}

impl PublishReceipt {
    pub fn resumed(&self) -> bool {
        self.transaction_hash.is_none()
    }
}

/// Publishes commitment roots through a [`LedgerClient`].
pub struct RootPublisher {
    ledger: Arc<dyn LedgerClient>,
    confirmation_timeout: Duration,
}

impl RootPublisher {
    pub fn new(ledger: Arc<dyn LedgerClient>, confirmation_timeout: Duration) -> Self {
        Self {
            ledger,
            confirmation_timeout,
        }
    }

    pub async fn read_root(&self, contract: Felt, key: &PoolKey) -> Result<OnChainRoot, LedgerError> {
        let values = self.ledger.read(&instruction::get_merkle_root(contract, key)).await?;
        Ok(OnChainRoot::decode(&values)?)
    }

    /// Set `root` for `key` and verify it by reading it back.
    ///
    /// A pool that already carries the same root is not resubmitted; a pool
    /// carrying a different root is a conflict. Every error is fatal for the
    /// pool run.
    pub async fn publish(&self, contract: Felt, key: &PoolKey, root: Felt) -> Result<PublishReceipt, LedgerError> {
        match self.read_root(contract, key).await? {
            OnChainRoot::Set(existing) if existing == root => {
                info!(day = key.day, period = key.period, root = %felt_to_hex(&root), "root already on-chain, skipping submission");
                return Ok(PublishReceipt {
                    transaction_hash: None,
                });
            }
            OnChainRoot::Set(existing) => {
                return Err(LedgerError::RootConflict {
                    existing: felt_to_hex(&existing),
                    computed: felt_to_hex(&root),
                });
            }
            OnChainRoot::Unset => {}
        }

        let call = instruction::set_merkle_root(contract, key, root);
        let account = self.ledger.account_address();
        let nonce = self.ledger.get_nonce(&account).await?;
        debug!(description = %call.description(), nonce = %felt_to_hex(&nonce), "submitting");

        let tx = self.ledger.submit(&call, nonce).await?;
        info!(day = key.day, period = key.period, tx = %tx, "root submitted, awaiting confirmation");

        let status = tokio::time::timeout(self.confirmation_timeout, self.ledger.wait_for_confirmation(&tx))
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout {
                tx: tx.clone(),
                secs: self.confirmation_timeout.as_secs(),
            })??;

        if let TxStatus::Reverted(reason) = status {
            return Err(LedgerError::Reverted { tx, reason });
        }

        let on_chain = self.read_root(contract, key).await?;
        if !on_chain.matches(&root) {
            let actual = match on_chain {
                OnChainRoot::Set(actual) => felt_to_hex(&actual),
                OnChainRoot::Unset => "0x0".to_string(),
            };
            warn!(tx = %tx, expected = %felt_to_hex(&root), %actual, "root read back does not match");
            return Err(LedgerError::RootMismatch {
                expected: felt_to_hex(&root),
                actual,
            });
        }

        info!(day = key.day, period = key.period, tx = %tx, root = %felt_to_hex(&root), "root confirmed on-chain");
        Ok(PublishReceipt {
            transaction_hash: Some(tx),
        })
    }
}

#[derive(Debug, Default)]
struct DryRunState {
    roots: HashMap<(Felt, PoolKey), Felt>,
    submissions: Vec<LedgerCall>,
    nonce: u64,
    fail_submit: bool,
    revert: Option<String>,
    root_override: Option<Felt>,
    hang: bool,
}

/// Dry-run ledger for testing. Records all submitted calls.
#[derive(Debug)]
pub struct DryRunLedger {
    account: Felt,
    state: Mutex<DryRunState>,
}

impl DryRunLedger {
    pub fn new() -> Self {
        Self {
            account: Felt::from(0xacc0u64),
            state: Mutex::new(DryRunState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DryRunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every submission.
    pub fn fail_submissions(&self) {
        self.state().fail_submit = true;
    }

    /// Accept submissions but report them as reverted.
    pub fn revert_with(&self, reason: &str) {
        self.state().revert = Some(reason.to_string());
    }

    /// Once a pool has a root, report `root` instead of the stored one.
    pub fn override_root(&self, root: Felt) {
        self.state().root_override = Some(root);
    }

    /// Never resolve confirmation waits.
    pub fn hang_confirmations(&self) {
        self.state().hang = true;
    }

    /// Pretend `root` was already published for `key`.
    pub fn set_root(&self, contract: Felt, key: PoolKey, root: Felt) {
        self.state().roots.insert((contract, key), root);
    }

    pub fn submissions(&self) -> Vec<LedgerCall> {
        self.state().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state().submissions.len()
    }
}

impl Default for DryRunLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn pool_key_of(call: &LedgerCall) -> Result<PoolKey, LedgerError> {
    let invalid = || LedgerError::Rpc(format!("malformed calldata for {}", call.description()));
    let [day, period, ..] = call.calldata.as_slice() else {
        return Err(invalid());
    };
    let day = u64::try_from(*day).map_err(|_| invalid())?;
    let period = u8::try_from(*period).map_err(|_| invalid())?;
    PoolKey::new(day, period).map_err(|_| invalid())
}

#[async_trait::async_trait]
impl LedgerClient for DryRunLedger {
    fn account_address(&self) -> Felt {
        self.account
    }

    async fn get_nonce(&self, _account: &Felt) -> Result<Felt, LedgerError> {
        Ok(Felt::from(self.state().nonce))
    }

    async fn submit(&self, call: &LedgerCall, nonce: Felt) -> Result<String, LedgerError> {
        let key = pool_key_of(call)?;
        let mut state = self.state();
        if state.fail_submit {
            return Err(LedgerError::Submit("dry-run: submission rejected".into()));
        }
        if nonce != Felt::from(state.nonce) {
            return Err(LedgerError::Submit(format!("dry-run: stale nonce {}", felt_to_hex(&nonce))));
        }

        state.submissions.push(call.clone());
        state.nonce += 1;
        if state.revert.is_none() {
            if let Some(root) = call.calldata.get(2) {
                state.roots.insert((call.contract_address, key), *root);
            }
        }
        info!(description = %call.description(), "dry-run: recorded transaction");
        Ok(format!("0x{:x}", state.nonce))
    }

    async fn wait_for_confirmation(&self, _tx_hash: &str) -> Result<TxStatus, LedgerError> {
        let (hang, revert) = {
            let state = self.state();
            (state.hang, state.revert.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(match revert {
            Some(reason) => TxStatus::Reverted(reason),
            None => TxStatus::Succeeded,
        })
    }

    async fn read(&self, call: &LedgerCall) -> Result<Vec<Felt>, LedgerError> {
        if call.entry_point != EntryPoint::GetMerkleRoot {
            return Err(LedgerError::Rpc(format!("dry-run: {} is not a view", call.entry_point.name())));
        }
        let key = pool_key_of(call)?;
        let state = self.state();
        let root = state
            .roots
            .get(&(call.contract_address, key))
            .map(|stored| state.root_override.unwrap_or(*stored))
            .unwrap_or(Felt::ZERO);
        Ok(vec![root])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: Felt = Felt::from_hex_unchecked("0xc0ffee");

    fn publisher(ledger: &Arc<DryRunLedger>) -> RootPublisher {
        RootPublisher::new(ledger.clone(), Duration::from_secs(5))
    }

    fn key() -> PoolKey {
        PoolKey::new(20_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_publish_submits_and_verifies() {
        let ledger = Arc::new(DryRunLedger::new());
        let receipt = publisher(&ledger).publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap();

        assert_eq!(receipt.transaction_hash.as_deref(), Some("0x1"));
        assert!(!receipt.resumed());
        assert_eq!(ledger.submission_count(), 1);
        assert_eq!(
            ledger.submissions()[0],
            instruction::set_merkle_root(CONTRACT, &key(), Felt::from(9u64))
        );
    }

    #[tokio::test]
    async fn test_publish_skips_when_root_already_set() {
        let ledger = Arc::new(DryRunLedger::new());
        ledger.set_root(CONTRACT, key(), Felt::from(9u64));

        let receipt = publisher(&ledger).publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap();
        assert!(receipt.resumed());
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_refuses_foreign_root() {
        let ledger = Arc::new(DryRunLedger::new());
        ledger.set_root(CONTRACT, key(), Felt::from(1u64));

        let err = publisher(&ledger).publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap_err();
        assert!(matches!(err, LedgerError::RootConflict { .. }));
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_reports_revert() {
        let ledger = Arc::new(DryRunLedger::new());
        ledger.revert_with("root already set");

        let err = publisher(&ledger).publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { reason, .. } if reason == "root already set"));
    }

    #[tokio::test]
    async fn test_publish_times_out() {
        let ledger = Arc::new(DryRunLedger::new());
        ledger.hang_confirmations();

        let publisher = RootPublisher::new(ledger.clone(), Duration::from_millis(20));
        let err = publisher.publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_publish_detects_mismatch_on_read_back() {
        let ledger = Arc::new(DryRunLedger::new());
        ledger.override_root(Felt::from(1u64));

        let err = publisher(&ledger).publish(CONTRACT, &key(), Felt::from(9u64)).await.unwrap_err();
        assert!(matches!(err, LedgerError::RootMismatch { .. }));
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_rejects_stale_nonce() {
        let ledger = DryRunLedger::new();
        let call = instruction::set_merkle_root(CONTRACT, &key(), Felt::from(1u64));
        ledger.submit(&call, Felt::ZERO).await.unwrap();
        assert!(matches!(
            ledger.submit(&call, Felt::ZERO).await,
            Err(LedgerError::Submit(_))
        ));
    }
}
