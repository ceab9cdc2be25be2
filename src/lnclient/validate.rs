use std::str::FromStr;

use bitcoin::secp256k1::PublicKey;

use super::{LnClientError, Result};

/// Payment hashes, preimages and description hashes are all 32 bytes.
pub fn hex32(operation: &'static str, field: &str, value: &str) -> Result<[u8; 32]> {
    hex::decode(value)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| {
            LnClientError::validation(operation, format!("{field} must be 32 bytes hex: {value}"))
        })
}

/// Empty means absent.
pub fn optional_hex32(
    operation: &'static str,
    field: &str,
    value: &str,
) -> Result<Option<[u8; 32]>> {
    if value.is_empty() {
        Ok(None)
    } else {
        hex32(operation, field, value).map(Some)
    }
}

pub fn public_key(operation: &'static str, value: &str) -> Result<PublicKey> {
    PublicKey::from_str(value).map_err(|e| {
        LnClientError::validation(operation, format!("invalid node public key {value}: {e}"))
    })
}
