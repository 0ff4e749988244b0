//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Postgres connection
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Funding ledger connection and treasury key
    #[serde(default)]
    pub solana: SolanaSettings,

    /// Payout defaults and disbursement tuning
    #[serde(default)]
    pub payout: PayoutSettings,

    /// Trigger server
    #[serde(default)]
    pub server: ServerSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.clone());
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.clone());
            Ok(settings)
        }
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// Recognised keys: `DATABASE_URL`, `CRON_SECRET`, `SOLANA_RPC_URL`,
    /// `SETTLEMENT_MODE`, `TREASURY_KEYPAIR`, `TREASURY_SECRET_KEY`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            debug!("DATABASE_URL override applied");
            self.database.url = Some(url);
        }
        if let Some(secret) = get("CRON_SECRET") {
            self.server.cron_secret = Some(secret);
        }
        if let Some(rpc) = get("SOLANA_RPC_URL") {
            debug!("SOLANA_RPC_URL override: {}", rpc);
            self.solana.rpc_url = rpc;
        }
        if let Some(mode) = get("SETTLEMENT_MODE") {
            match mode.to_lowercase().as_str() {
                "live" => self.solana.mode = LedgerMode::Live,
                "mock" => self.solana.mode = LedgerMode::Mock,
                other => debug!("Ignoring unknown SETTLEMENT_MODE {}", other),
            }
        }
        if let Some(path) = get("TREASURY_KEYPAIR") {
            self.solana.keypair_path = Some(path);
        }
        if let Some(secret) = get("TREASURY_SECRET_KEY") {
            self.solana.secret_key = Some(secret);
        }
    }

    /// Check value ranges that would otherwise surface mid-cycle
    pub fn validate(&self) -> Result<()> {
        self.payout.validate()?;
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid("database.max_connections must be > 0".into()));
        }
        Ok(())
    }

    /// Checks for running against the real ledger
    pub fn validate_live(&self) -> Result<()> {
        self.validate()?;
        if self.solana.mode == LedgerMode::Live
            && self.solana.keypair_path.is_none()
            && self.solana.secret_key.is_none()
        {
            return Err(SettingsError::Missing("TREASURY_KEYPAIR or TREASURY_SECRET_KEY"));
        }
        Ok(())
    }

    /// Checks for exposing the trigger endpoint
    pub fn validate_server(&self) -> Result<()> {
        match self.server.cron_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => Ok(()),
            _ => Err(SettingsError::Missing("CRON_SECRET")),
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Postgres URL. When unset the service runs on the in-memory store.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Ledger mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// In-memory ledger, nothing leaves the process
    #[default]
    Mock,
    /// Real Solana RPC
    Live,
}

/// Solana settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaSettings {
    #[serde(default)]
    pub mode: LedgerMode,

    /// RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Commitment level awaited before a transfer counts as confirmed
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Cluster name used for explorer links (devnet, testnet, mainnet-beta)
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Path to the treasury keypair (Solana CLI JSON format)
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Base58 treasury secret, environment only
    #[serde(skip)]
    pub secret_key: Option<String>,

    /// Starting balance of the mock ledger in SOL
    #[serde(default = "default_mock_balance")]
    pub mock_balance_sol: f64,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_cluster() -> String {
    "devnet".to_string()
}

fn default_mock_balance() -> f64 {
    100.0
}

impl Default for SolanaSettings {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            rpc_url: default_rpc_url(),
            commitment: default_commitment(),
            cluster: default_cluster(),
            keypair_path: None,
            secret_key: None,
            mock_balance_sol: default_mock_balance(),
        }
    }
}

/// Payout defaults and disbursement tuning.
///
/// `budget_sol`, `max_per_user_sol` and `min_payout_sol` are the fallbacks
/// used when the stored payout config row is missing or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutSettings {
    #[serde(default = "default_budget")]
    pub budget_sol: f64,

    #[serde(default = "default_max_per_user")]
    pub max_per_user_sol: f64,

    #[serde(default = "default_min_payout")]
    pub min_payout_sol: f64,

    /// Reserved for network fees on top of the batch total
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer_sol: f64,

    /// Transfers in flight at once
    #[serde(default = "default_concurrency")]
    pub transfer_concurrency: usize,

    /// Per-transfer confirmation deadline
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,

    /// Failed records with fewer attempts than this are reported as retryable
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Claims older than this are released at cycle start
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: u64,
}

fn default_budget() -> f64 {
    1.0
}

fn default_max_per_user() -> f64 {
    0.1
}

fn default_min_payout() -> f64 {
    0.001
}

fn default_fee_buffer() -> f64 {
    0.01
}

fn default_concurrency() -> usize {
    4
}

fn default_transfer_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_stale_claim() -> u64 {
    3600
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            budget_sol: default_budget(),
            max_per_user_sol: default_max_per_user(),
            min_payout_sol: default_min_payout(),
            fee_buffer_sol: default_fee_buffer(),
            transfer_concurrency: default_concurrency(),
            transfer_timeout_secs: default_transfer_timeout(),
            max_retries: default_max_retries(),
            stale_claim_secs: default_stale_claim(),
        }
    }
}

impl PayoutSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("payout.budget_sol", self.budget_sol),
            ("payout.max_per_user_sol", self.max_per_user_sol),
            ("payout.min_payout_sol", self.min_payout_sol),
            ("payout.fee_buffer_sol", self.fee_buffer_sol),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::Invalid(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if self.transfer_concurrency == 0 {
            return Err(SettingsError::Invalid("payout.transfer_concurrency must be > 0".into()));
        }
        if self.transfer_timeout_secs == 0 {
            return Err(SettingsError::Invalid("payout.transfer_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Trigger server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Shared secret expected as `Authorization: Bearer <secret>`
    #[serde(default)]
    pub cron_secret: Option<String>,

    /// Built-in scheduler interval, 0 disables it
    #[serde(default = "default_schedule_interval")]
    pub schedule_interval_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_schedule_interval() -> u64 {
    6 * 60 * 60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cron_secret: None,
            schedule_interval_secs: default_schedule_interval(),
        }
    }
}
