//! StakePool Crypto
//!
//! Stark-curve signing keys and the outcome signer that issues
//! domain-separated, expiring claim vouchers.

pub mod keys;
pub mod sign;
pub mod voucher;

use stakepool_core::numeric::NumericError;
use thiserror::Error;

pub use keys::SigningKeypair;
pub use sign::{sign_message_hash, verify_signature, ClaimSignature};
pub use voucher::{
    voucher_expiry, ClaimFields, Domain, OutcomeSigner, Voucher, VOUCHER_VALIDITY_SECS,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid short string {0:?}")]
    InvalidShortString(String),
    #[error("amount out of range: {0}")]
    Amount(#[from] NumericError),
    #[error("signing failed: {0}")]
    Signing(String),
}
