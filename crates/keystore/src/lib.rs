//! Attention Coin Keystore
//!
//! Treasury keypair loading and path utilities.
//!
//! ## Features
//!
//! - Solana CLI keypair files (JSON array of 64 bytes)
//! - Base58 secret keys from the environment (64-byte keypair or 32-byte seed)
//! - Cross-platform config directory and `~` expansion

mod keypair;
mod paths;

pub use keypair::{keypair_from_base58, load_keypair_file};
pub use paths::{default_config_dir, expand_path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Failed to read key file: {0}")]
    ReadError(String),

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, KeystoreError>;
