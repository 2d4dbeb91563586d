//! Domain-separated claim vouchers.
//!
//! The hashing follows the Starknet typed-data layout (revision 1): a domain
//! hash bound to the chain id, a struct hash over the claim fields and expiry,
//! and a message hash tying both to the claiming user. The message hash is
//! then signed with the verifier key of the pool kind.

use num_bigint::BigUint;
use stakepool_core::hash::hash_many;
use stakepool_core::numeric::split_wide;
use stakepool_core::{Felt, PoolKey};
use starknet::core::utils::{cairo_short_string_to_felt, starknet_keccak};

use crate::keys::SigningKeypair;
use crate::sign::{sign_message_hash, verify_signature, ClaimSignature};
use crate::SignerError;

/// Vouchers stay claimable for 48 hours after the run that issued them.
pub const VOUCHER_VALIDITY_SECS: u64 = 48 * 60 * 60;

pub const APP_NAME: &str = "StakePool";
pub const APP_VERSION: &str = "1";
pub const REVISION: u64 = 1;
pub const MESSAGE_PREFIX: &str = "StarkNet Message";

pub const DOMAIN_TYPE: &str = r#""StarknetDomain"("name":"shortstring","version":"shortstring","chainId":"shortstring","revision":"shortstring")"#;
pub const PENALTY_CLAIM_TYPE: &str = r#""PenaltyClaim"("user":"ContractAddress","day":"u128","period":"u128","amount_low":"u128","amount_high":"u128","expiry":"u128")"#;
pub const SESSION_CLAIM_TYPE: &str = r#""SessionClaim"("user":"ContractAddress","session_id":"felt","amount_low":"u128","amount_high":"u128","expiry":"u128")"#;

fn short_string(s: &str) -> Result<Felt, SignerError> {
    cairo_short_string_to_felt(s).map_err(|_| SignerError::InvalidShortString(s.to_string()))
}

/// Expiry shared by every voucher issued in one run.
pub fn voucher_expiry(now: u64) -> u64 {
    now.saturating_add(VOUCHER_VALIDITY_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub chain_id: Felt,
    hash: Felt,
}

impl Domain {
    /// Build the domain for a chain id short string such as `SN_SEPOLIA`.
    pub fn new(chain_id: &str) -> Result<Self, SignerError> {
        Self::from_chain_id(short_string(chain_id)?)
    }

    pub fn from_chain_id(chain_id: Felt) -> Result<Self, SignerError> {
        let hash = hash_many(&[
            starknet_keccak(DOMAIN_TYPE.as_bytes()),
            short_string(APP_NAME)?,
            short_string(APP_VERSION)?,
            chain_id,
            Felt::from(REVISION),
        ]);
        Ok(Self { chain_id, hash })
    }

    pub fn hash(&self) -> Felt {
        self.hash
    }
}

/// Pool-kind specific fields bound into a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimFields {
    Penalty { pool_key: PoolKey, amount: BigUint },
    Session { session_id: Felt, amount: BigUint },
}

impl ClaimFields {
    fn type_hash(&self) -> Felt {
        let ty = match self {
            Self::Penalty { .. } => PENALTY_CLAIM_TYPE,
            Self::Session { .. } => SESSION_CLAIM_TYPE,
        };
        starknet_keccak(ty.as_bytes())
    }

    /// `H(type, user, <fields>, expiry)`.
    pub fn struct_hash(&self, user: &Felt, expiry: u64) -> Result<Felt, SignerError> {
        let mut elements = vec![self.type_hash(), *user];
        match self {
            Self::Penalty { pool_key, amount } => {
                let (low, high) = split_wide(amount)?;
                elements.extend([
                    Felt::from(pool_key.day),
                    Felt::from(pool_key.period as u64),
                    Felt::from(low),
                    Felt::from(high),
                ]);
            }
            Self::Session { session_id, amount } => {
                let (low, high) = split_wide(amount)?;
                elements.extend([*session_id, Felt::from(low), Felt::from(high)]);
            }
        }
        elements.push(Felt::from(expiry));
        Ok(hash_many(&elements))
    }
}

/// `H(prefix, domain, user, struct)`.
pub fn message_hash(domain: &Domain, user: &Felt, struct_hash: &Felt) -> Result<Felt, SignerError> {
    Ok(hash_many(&[
        short_string(MESSAGE_PREFIX)?,
        domain.hash(),
        *user,
        *struct_hash,
    ]))
}

/// A signed claim authorization for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    pub message_hash: Felt,
    pub r: Felt,
    pub s: Felt,
    pub public_key: Felt,
    pub expiry: u64,
}

impl Voucher {
    pub fn signature(&self) -> ClaimSignature {
        ClaimSignature { r: self.r, s: self.s }
    }

    /// Check the signature against `public_key`.
    pub fn verify(&self, public_key: &Felt) -> bool {
        verify_signature(public_key, &self.message_hash, &self.signature())
    }
}

/// Signs claims for one pool kind with its verifier key.
#[derive(Debug, Clone)]
pub struct OutcomeSigner {
    keypair: SigningKeypair,
    domain: Domain,
}

impl OutcomeSigner {
    pub fn new(keypair: SigningKeypair, domain: Domain) -> Self {
        Self { keypair, domain }
    }

    pub fn public_key(&self) -> Felt {
        self.keypair.public_key()
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn message_hash(&self, user: &Felt, fields: &ClaimFields, expiry: u64) -> Result<Felt, SignerError> {
        let struct_hash = fields.struct_hash(user, expiry)?;
        message_hash(&self.domain, user, &struct_hash)
    }

    pub fn sign_claim(&self, user: &Felt, fields: &ClaimFields, expiry: u64) -> Result<Voucher, SignerError> {
        let message_hash = self.message_hash(user, fields, expiry)?;
        let signature = sign_message_hash(&self.keypair, &message_hash)?;
        Ok(Voucher {
            message_hash,
            r: signature.r,
            s: signature.s,
            public_key: self.keypair.public_key(),
            expiry,
        })
    }
}
