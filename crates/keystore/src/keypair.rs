//! Treasury keypair loading

use std::fs;
use std::path::Path;

use solana_sdk::signature::Keypair;
use tracing::debug;

use crate::{KeystoreError, Result};

/// Load a keypair from a Solana CLI keypair file (`[u8; 64]` as a JSON array).
pub fn load_keypair_file(path: &Path) -> Result<Keypair> {
    debug!("Loading keypair from {}", path.display());
    let content = fs::read_to_string(path)
        .map_err(|e| KeystoreError::ReadError(format!("{}: {}", path.display(), e)))?;
    let bytes: Vec<u8> = serde_json::from_str(content.trim())
        .map_err(|e| KeystoreError::InvalidFormat(format!("expected JSON byte array: {}", e)))?;
    keypair_from_bytes(&bytes)
}

/// Decode a base58 secret: either a full 64-byte keypair or a 32-byte seed.
pub fn keypair_from_base58(encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| KeystoreError::InvalidFormat(format!("base58: {}", e)))?;
    keypair_from_bytes(&bytes)
}

/// Build a keypair from a 32-byte ed25519 secret key.
fn keypair_from_secret_bytes(secret: &[u8; 32]) -> Result<Keypair> {
    let signing_key = ed25519_dalek::SigningKey::from_bytes(secret);
    let public_bytes = signing_key.verifying_key().to_bytes();

    let mut full_key = [0u8; 64];
    full_key[..32].copy_from_slice(secret);
    full_key[32..].copy_from_slice(&public_bytes);
    Keypair::try_from(full_key.as_ref())
        .map_err(|e| KeystoreError::InvalidFormat(e.to_string()))
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    match bytes.len() {
        64 => Keypair::try_from(bytes)
            .map_err(|e| KeystoreError::InvalidFormat(e.to_string())),
        32 => {
            let mut secret = [0u8; 32];
            secret.copy_from_slice(bytes);
            keypair_from_secret_bytes(&secret)
        }
        n => Err(KeystoreError::InvalidFormat(format!(
            "expected 32 or 64 key bytes, got {}",
            n
        ))),
    }
}
