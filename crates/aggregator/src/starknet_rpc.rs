//! JSON-RPC ledger client over the `starknet` provider and account stack.

use std::time::Duration;

use stakepool_core::numeric::{felt_to_hex, parse_felt};
use stakepool_core::Felt;
use stakepool_settlement::instruction::LedgerCall;
use starknet::accounts::{Account, ConnectedAccount, ExecutionEncoding, SingleOwnerAccount};
use starknet::core::types::{BlockId, BlockTag, Call, ExecutionResult, FunctionCall, StarknetError};
use starknet::core::utils::get_selector_from_name;
use starknet::providers::jsonrpc::HttpTransport;
use starknet::providers::{JsonRpcClient, Provider, ProviderError};
use starknet::signers::{LocalWallet, SigningKey};
use tracing::{debug, info};
use url::Url;

use crate::poster::{LedgerClient, LedgerError, TxStatus};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Nonces and view calls both use the pending block. Receipts are served as
/// soon as a transaction lands there, before it reaches `latest`.
const STATE_VIEW: BlockId = BlockId::Tag(BlockTag::Pending);

/// Submits through a single-owner account and polls receipts until executed.
pub struct StarknetLedger {
    account: SingleOwnerAccount<JsonRpcClient<HttpTransport>, LocalWallet>,
    poll_interval: Duration,
}

impl StarknetLedger {
    pub fn new(rpc_url: Url, account_address: Felt, private_key: Felt, chain_id: Felt) -> Self {
        let provider = JsonRpcClient::new(HttpTransport::new(rpc_url.clone()));
        let signer = LocalWallet::from(SigningKey::from_secret_scalar(private_key));
        let account = SingleOwnerAccount::new(provider, signer, account_address, chain_id, ExecutionEncoding::New);

        info!(rpc_url = %rpc_url, account = %felt_to_hex(&account_address), "starknet ledger client ready");
        Self {
            account,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the receipt polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

fn selector(call: &LedgerCall) -> Result<Felt, LedgerError> {
    get_selector_from_name(call.entry_point.name()).map_err(|e| LedgerError::Rpc(e.to_string()))
}

fn rpc_error(err: ProviderError) -> LedgerError {
    LedgerError::Rpc(err.to_string())
}

#[async_trait::async_trait]
impl LedgerClient for StarknetLedger {
    fn account_address(&self) -> Felt {
        self.account.address()
    }

    async fn get_nonce(&self, account: &Felt) -> Result<Felt, LedgerError> {
        self.account
            .provider()
            .get_nonce(STATE_VIEW, *account)
            .await
            .map_err(rpc_error)
    }

    async fn submit(&self, call: &LedgerCall, nonce: Felt) -> Result<String, LedgerError> {
        let invoke = Call {
            to: call.contract_address,
            selector: selector(call)?,
            calldata: call.calldata.clone(),
        };

        let result = self
            .account
            .execute_v3(vec![invoke])
            .nonce(nonce)
            .send()
            .await
            .map_err(|e| LedgerError::Submit(e.to_string()))?;

        Ok(felt_to_hex(&result.transaction_hash))
    }

    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<TxStatus, LedgerError> {
        let hash = parse_felt(tx_hash).map_err(|e| LedgerError::Rpc(e.to_string()))?;

        loop {
            match self.account.provider().get_transaction_receipt(hash).await {
                Ok(receipt) => {
                    return Ok(match receipt.receipt.execution_result() {
                        ExecutionResult::Succeeded => TxStatus::Succeeded,
                        ExecutionResult::Reverted { reason } => TxStatus::Reverted(reason.clone()),
                    });
                }
                Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => {
                    debug!(tx = tx_hash, "transaction not yet received, polling");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(rpc_error(e)),
            }
        }
    }

    async fn read(&self, call: &LedgerCall) -> Result<Vec<Felt>, LedgerError> {
        let request = FunctionCall {
            contract_address: call.contract_address,
            entry_point_selector: selector(call)?,
            calldata: call.calldata.clone(),
        };

        self.account
            .provider()
            .call(request, STATE_VIEW)
            .await
            .map_err(rpc_error)
    }
}
