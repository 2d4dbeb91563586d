//! StakePool Aggregator
//!
//! Drives pools through fetch, validation, reward calculation and Merkle
//! commitment, publishes the root on-chain via a [`poster::LedgerClient`],
//! and only after the root is confirmed and read back signs vouchers and
//! persists claim records through a [`store::ParticipantStore`].

pub mod batch;
pub mod poster;
pub mod processor;
pub mod service;
pub mod sqlite;
pub mod starknet_rpc;
pub mod store;
#[cfg(test)]
mod tests;

pub use batch::PoolBatch;
pub use poster::{DryRunLedger, LedgerClient, LedgerError, PublishReceipt, RootPublisher, TxStatus};
pub use processor::{unix_now, Clock, PoolKindConfig, PoolOutcome, PoolProcessor, PoolSetup, SkipReason};
pub use service::{AggregatorConfig, AggregatorService, BatchResult, PoolReport};
pub use sqlite::SqliteStore;
pub use starknet_rpc::StarknetLedger;
pub use store::{ClaimRecord, MemoryStore, ParticipantStore, ParticipantUpdate, StorageError, StoreObj};

use stakepool_core::PoolKind;
use thiserror::Error;

/// Fatal outcome of one pool run.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("validation failed: {0}")]
    Validation(#[from] stakepool_settlement::ValidationError),
    #[error("merkle error: {0}")]
    Merkle(#[from] stakepool_merkle::MerkleError),
    #[error("signer error: {0}")]
    Signer(#[from] stakepool_crypto::SignerError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0} pools are not configured")]
    NotConfigured(PoolKind),
}
