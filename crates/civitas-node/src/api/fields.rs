//! Flexible field-element wire encoding (spec §6): a caller may submit
//! a field element as a decimal string or as 32-byte little-endian hex,
//! optionally `0x`-prefixed. Both must be accepted on input; responses
//! always use hex.

use ark_bn254::Fr;
use civitas_crypto::poseidon::{bytes_to_fr, fr_to_bytes};
use civitas_types::CoreError;
use std::str::FromStr;

pub fn parse_field_element(input: &str) -> Result<[u8; 32], CoreError> {
    let trimmed = input.trim();
    let hex_candidate = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_candidate.len() == 64 && hex_candidate.bytes().all(|b| b.is_ascii_hexdigit()) {
        let bytes = hex::decode(hex_candidate)
            .map_err(|e| CoreError::BadEncoding(format!("invalid hex field element: {e}")))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        // `bytes_to_fr` reduces mod the BN254 scalar field; a value at or
        // above the modulus round-trips to a different byte string.
        let canonical = fr_to_bytes(&bytes_to_fr(&out));
        if canonical != out {
            return Err(CoreError::FieldOutOfRange(format!(
                "hex value out of field range: 0x{hex_candidate}"
            )));
        }
        return Ok(out);
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) && !trimmed.is_empty() {
        let fr = Fr::from_str(trimmed)
            .map_err(|_| CoreError::FieldOutOfRange(format!("decimal value out of field range: {trimmed}")))?;
        return Ok(fr_to_bytes(&fr));
    }
    Err(CoreError::BadEncoding(format!(
        "field element must be decimal or 64-char hex, got: {trimmed}"
    )))
}

pub fn hex_field_element(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
