use stakepool_core::Felt;
use starknet::core::crypto::{ecdsa_sign, ecdsa_verify, Signature};

use crate::keys::SigningKeypair;
use crate::SignerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSignature {
    pub r: Felt,
    pub s: Felt,
}

/// Sign a message hash with an RFC 6979 deterministic nonce.
pub fn sign_message_hash(keypair: &SigningKeypair, message_hash: &Felt) -> Result<ClaimSignature, SignerError> {
    let signature = ecdsa_sign(keypair.secret(), message_hash)
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    Ok(ClaimSignature {
        r: signature.r,
        s: signature.s,
    })
}

/// Verify a signature
pub fn verify_signature(public_key: &Felt, message_hash: &Felt, signature: &ClaimSignature) -> bool {
    let signature = Signature {
        r: signature.r,
        s: signature.s,
    };
    ecdsa_verify(public_key, message_hash, &signature).unwrap_or(false)
}
