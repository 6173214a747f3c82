//! Opaque bearer values: action tokens and API session credentials.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix of the string rendered into QR codes.
pub const QR_PREFIX: &str = "perk:v1:";

const TOKEN_BYTES: usize = 32;

/// 256 random bits, base64url without padding.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256. Only hashes are persisted.
pub fn hash_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

pub fn qr_payload(value: &str) -> String {
    format!("{QR_PREFIX}{value}")
}

/// Accepts either the raw value or a scanned QR payload.
pub fn strip_qr_prefix(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.strip_prefix(QR_PREFIX).unwrap_or(trimmed)
}
