use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Size in bytes of a channel's external id.
pub const CHANNEL_ID_BYTES: usize = 64;

/// Generate `len` random bytes and encode them URL-safe without padding.
pub fn generate_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a fresh external channel id.
pub fn generate_channel_id() -> String {
    generate_secret(CHANNEL_ID_BYTES)
}

/// Decode a secret back into its raw bytes.
pub fn secret_bytes(encoded: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(encoded)?)
}
