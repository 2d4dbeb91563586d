use std::fmt;

use stakepool_core::numeric::{felt_to_hex, parse_felt};
use stakepool_core::Felt;
use starknet_crypto::get_public_key;

use crate::SignerError;

/// A Stark-curve private scalar and its public key.
#[derive(Clone)]
pub struct SigningKeypair {
    secret: Felt,
    public: Felt,
}

impl SigningKeypair {
    pub fn from_secret(secret: Felt) -> Result<Self, SignerError> {
        if secret == Felt::ZERO {
            return Err(SignerError::InvalidPrivateKey);
        }
        Ok(Self {
            public: get_public_key(&secret),
            secret,
        })
    }

    /// Parse a `0x` hex (or decimal) private key.
    pub fn from_secret_hex(secret: &str) -> Result<Self, SignerError> {
        let secret = parse_felt(secret).map_err(|_| SignerError::InvalidPrivateKey)?;
        Self::from_secret(secret)
    }

    pub fn public_key(&self) -> Felt {
        self.public
    }

    pub(crate) fn secret(&self) -> &Felt {
        &self.secret
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &felt_to_hex(&self.public))
            .finish_non_exhaustive()
    }
}
