//! Attention Coin Settings
//!
//! Configuration management for the payout service.
//!
//! ## Features
//!
//! - Database, Solana, payout and server sections
//! - JSON settings file with per-field defaults
//! - Environment overrides for secrets and deployment endpoints
//! - Payout config merge (stored row over hardcoded defaults)
//!
//! ## Usage
//!
//! ```no_run
//! use attention_settings::Settings;
//!
//! // Load the settings file (or defaults) and apply environment overrides
//! let mut settings = Settings::load_or_default()?;
//! settings.apply_env();
//! settings.validate()?;
//!
//! println!("budget: {} SOL", settings.payout.budget_sol);
//! # Ok::<(), attention_settings::SettingsError>(())
//! ```

mod config;
mod payout;

pub use config::{
    Settings, DatabaseSettings, SolanaSettings, PayoutSettings, ServerSettings,
    LedgerMode,
};
pub use payout::{PayoutConfig, PayoutLimits, StoredPayoutConfig};

use std::path::PathBuf;

use thiserror::Error;
use attention_keystore::default_config_dir;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
