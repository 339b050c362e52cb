use alloy_primitives::{Address, Bytes, U256, keccak256};
use anyhow::{Context, Result};

pub const SELECTOR_LENGTH: usize = 4;

// First four bytes of the keccak-256 hash of a canonical signature, e.g. "totalSupply()"
pub fn selector(signature: &str) -> [u8; SELECTOR_LENGTH] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; SELECTOR_LENGTH];
    out.copy_from_slice(&hash[..SELECTOR_LENGTH]);
    out
}

// Selector followed by the ABI encoded arguments
pub fn call_data(signature: &str, encoded_args: &[u8]) -> Bytes {
    let mut data = Vec::with_capacity(SELECTOR_LENGTH + encoded_args.len());
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(encoded_args);
    Bytes::from(data)
}

// Splits call data into its selector and argument bytes
pub fn split_call_data(data: &[u8]) -> Option<([u8; SELECTOR_LENGTH], &[u8])> {
    if data.len() < SELECTOR_LENGTH {
        return None;
    }
    let mut sel = [0u8; SELECTOR_LENGTH];
    sel.copy_from_slice(&data[..SELECTOR_LENGTH]);
    Some((sel, &data[SELECTOR_LENGTH..]))
}

pub fn string_to_address(value: &str) -> Result<Address> {
    value
        .trim()
        .parse::<Address>()
        .with_context(|| format!("Failed to parse address: '{}'", value))
}

// Token ids start at one, zero is the contracts' "no token" sentinel
pub fn token_id_or_none(value: U256) -> Option<U256> {
    if value.is_zero() { None } else { Some(value) }
}

// Applies a decimal multiplier to a wei amount with a fixed precision
pub fn scale_u128(value: u128, multiplier: f64, precision: u64) -> u128 {
    let factor = (multiplier * precision as f64).round() as u128;
    value.saturating_mul(factor) / precision as u128
}
