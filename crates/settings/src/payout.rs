//! Payout configuration provider
//!
//! The admin panel stores an optional, possibly partial payout config row.
//! Each cycle merges that row over the defaults from [`PayoutSettings`] and
//! converts the result to lamports once, right before allocation.

use serde::{Deserialize, Serialize};

use attention_core::sol_to_lamports;

use crate::{PayoutSettings, Result, SettingsError};

/// Stored payout config row, every field optional (whole SOL)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredPayoutConfig {
    pub budget_sol: Option<f64>,
    pub max_per_user_sol: Option<f64>,
    pub min_payout_sol: Option<f64>,
}

/// Effective payout config for one cycle (whole SOL)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutConfig {
    pub budget_sol: f64,
    pub max_per_user_sol: f64,
    pub min_payout_sol: f64,
}

/// Payout config in lamports, the form the allocation calculator consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutLimits {
    pub budget: u64,
    pub max_per_user: u64,
    pub min_payout: u64,
}

impl PayoutConfig {
    /// Merge a stored row (if any) over the configured defaults
    pub fn with_defaults(stored: Option<&StoredPayoutConfig>, defaults: &PayoutSettings) -> Self {
        let stored = stored.cloned().unwrap_or_default();
        Self {
            budget_sol: stored.budget_sol.unwrap_or(defaults.budget_sol),
            max_per_user_sol: stored.max_per_user_sol.unwrap_or(defaults.max_per_user_sol),
            min_payout_sol: stored.min_payout_sol.unwrap_or(defaults.min_payout_sol),
        }
    }

    /// Convert to lamports, rejecting negative or non-finite values
    pub fn limits(&self) -> Result<PayoutLimits> {
        let convert = |name: &str, sol: f64| {
            sol_to_lamports(sol).map_err(|e| SettingsError::Invalid(format!("{}: {}", name, e)))
        };
        Ok(PayoutLimits {
            budget: convert("budget", self.budget_sol)?,
            max_per_user: convert("max_per_user", self.max_per_user_sol)?,
            min_payout: convert("min_payout", self.min_payout_sol)?,
        })
    }
}
