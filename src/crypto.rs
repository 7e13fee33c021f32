use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

// A 64-char secret is read as hex, anything else as raw bytes.
pub(crate) fn hmac_key(secret: &str) -> Result<Vec<u8>> {
    if secret.len() == 64 {
        hex::decode(secret).context("HMAC_SECRET must be a valid hex string")
    } else {
        Ok(secret.as_bytes().to_vec())
    }
}

/// HMAC-SHA256 of `key`, hex encoded. Without a secret the key itself is the
/// MAC key.
pub fn hash_api_key(key: &str, secret: Option<&str>) -> Result<String> {
    let mac_key = match secret {
        Some(secret) => hmac_key(secret)?,
        None => key.as_bytes().to_vec(),
    };
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| anyhow::anyhow!("Failed to create HMAC: {}", e))?;

    mac.update(key.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare a presented key against the configured one by their hashes.
pub fn verify_api_key(presented: &str, expected: &str, secret: Option<&str>) -> Result<bool> {
    let expected_hash = hash_api_key(expected, secret)?;
    let expected_bytes = hex::decode(expected_hash)?;

    let mac_key = match secret {
        Some(secret) => hmac_key(secret)?,
        None => presented.as_bytes().to_vec(),
    };
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| anyhow::anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(presented.as_bytes());

    // Constant-time comparison.
    Ok(mac.verify_slice(&expected_bytes).is_ok())
}
