//! Fixed-point integer helpers.
//!
//! Amounts are on-chain token quantities and are always carried as unsigned
//! arbitrary-precision integers, never floats.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use thiserror::Error;

use crate::hash::Felt;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("value does not fit in 256 bits: {0}")]
    Overflow(String),
    #[error("invalid decimal integer: {0:?}")]
    InvalidDecimal(String),
    #[error("invalid field element: {0:?}")]
    InvalidFelt(String),
}

/// `2^256 - 1`.
pub fn u256_max() -> BigUint {
    (BigUint::one() << 256usize) - BigUint::one()
}

pub fn fits_u256(value: &BigUint) -> bool {
    value.bits() <= 256
}

/// Split a 256-bit value into `(low, high)` 128-bit halves.
pub fn split_wide(value: &BigUint) -> Result<(u128, u128), NumericError> {
    if !fits_u256(value) {
        return Err(NumericError::Overflow(value.to_string()));
    }
    let mask = (BigUint::one() << 128usize) - BigUint::one();
    let low = (value & &mask).to_u128().unwrap_or_default();
    let high = (value >> 128usize).to_u128().unwrap_or_default();
    Ok((low, high))
}

/// Inverse of [`split_wide`].
pub fn join_wide(low: u128, high: u128) -> BigUint {
    (BigUint::from(high) << 128usize) | BigUint::from(low)
}

/// Truncate an identifier to its low 64 bits.
pub fn narrow_u64(value: &BigUint) -> u64 {
    let mask = BigUint::from(u64::MAX);
    (value & mask).to_u64().unwrap_or_default()
}

/// `0x`-prefixed lowercase hex with no leading zeros (`0x0` for zero).
pub fn to_canonical_hex(value: &BigUint) -> String {
    if value.is_zero() {
        return "0x0".to_string();
    }
    format!("{:#x}", value)
}

/// Hex-prefixed strings pass through lowercased; anything else is returned as-is.
pub fn normalize_hex(value: &str) -> String {
    if value.starts_with("0x") || value.starts_with("0X") {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

pub fn felt_to_hex(felt: &Felt) -> String {
    to_canonical_hex(&felt.to_biguint())
}

/// Canonical hex of the field element `value` denotes, so `0x01` and `0x1`
/// compare equal. Values that are not field elements fall back to
/// [`normalize_hex`].
pub fn canonical_felt_hex(value: &str) -> String {
    match parse_felt(value) {
        Ok(felt) => felt_to_hex(&felt),
        Err(_) => normalize_hex(value),
    }
}

/// Parse a base-10 amount as stored by the backend.
pub fn parse_decimal(value: &str) -> Result<BigUint, NumericError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NumericError::InvalidDecimal(value.to_string()));
    }
    BigUint::parse_bytes(trimmed.as_bytes(), 10)
        .ok_or_else(|| NumericError::InvalidDecimal(value.to_string()))
}

/// Parse a field element from `0x` hex or plain decimal.
pub fn parse_felt(value: &str) -> Result<Felt, NumericError> {
    let invalid = || NumericError::InvalidFelt(value.to_string());
    let trimmed = value.trim();
    if let Some(digits) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        if digits.is_empty() {
            return Err(invalid());
        }
        Felt::from_hex(&format!("0x{}", digits.to_ascii_lowercase())).map_err(|_| invalid())
    } else {
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        Felt::from_dec_str(trimmed).map_err(|_| invalid())
    }
}

/// Serde adapter writing [`BigUint`] as a decimal string.
pub mod decimal {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_decimal(&s).map_err(D::Error::custom)
    }
}
