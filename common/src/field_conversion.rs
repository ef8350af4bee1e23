use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num::{BigUint, Num};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("empty field element")]
    Empty,
    #[error("`{0}` is not a decimal or 0x-prefixed hexadecimal integer")]
    NotAnInteger(String),
    #[error("`{0}` is not below the BN254 scalar field modulus")]
    OutOfRange(String),
}

pub fn fr_modulus() -> BigUint {
    BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le())
}

pub fn fr_to_biguint(value: &Fr) -> BigUint {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le())
}

/// Canonical rendering used whenever a field element crosses into an input map.
pub fn fr_to_decimal(value: &Fr) -> String {
    fr_to_biguint(value).to_str_radix(10)
}

pub fn fr_to_hex(value: &Fr) -> String {
    format!("0x{}", fr_to_biguint(value).to_str_radix(16))
}

/// Returns `None` for values outside `[0, p)`; no implicit reduction.
pub fn fr_from_biguint(value: &BigUint) -> Option<Fr> {
    if *value >= fr_modulus() {
        return None;
    }
    Some(Fr::from_le_bytes_mod_order(&value.to_bytes_le()))
}

/// Parses a canonical field element. Accepts decimal or `0x`-prefixed hex.
pub fn fr_from_str(s: &str) -> Result<Fr, FieldParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(FieldParseError::Empty);
    }
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => BigUint::from_str_radix(hex, 16),
        None => BigUint::from_str_radix(trimmed, 10),
    }
    .map_err(|_| FieldParseError::NotAnInteger(trimmed.to_string()))?;

    fr_from_biguint(&parsed).ok_or_else(|| FieldParseError::OutOfRange(trimmed.to_string()))
}

pub fn fr_from_i64(value: i64) -> Fr {
    if value >= 0 {
        Fr::from(value as u64)
    } else {
        -Fr::from(value.unsigned_abs())
    }
}

/// Interprets a field element as a small index, e.g. a slot or a length
/// stored inside a verification key.
pub fn fr_to_index(value: &Fr) -> Option<usize> {
    let limbs = value.into_bigint().0;
    if limbs[1..].iter().any(|limb| *limb != 0) {
        return None;
    }
    usize::try_from(limbs[0]).ok()
}

pub fn fr_from_index(index: usize) -> Fr {
    Fr::from(index as u64)
}

/// Fixed-width big-endian encoding, e.g. for hashes stored in program bytes.
pub fn fr_to_be_bytes(value: &Fr) -> [u8; 32] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    word
}
