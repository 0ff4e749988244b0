//! Attention Coin Settlement
//!
//! Funding source for payout disbursement: a thin Solana client that holds
//! the treasury keypair and moves lamports to payee wallets.
//!
//! ## Funding Source Contract
//!
//! 1. **Spendable balance**: lamports the treasury can send right now.
//! 2. **Transfer**: one system transfer to one destination. Only returns a
//!    signature after the cluster has confirmed it at the configured
//!    commitment; anything short of that is an error.
//! 3. **Explorer URL**: audit link for a confirmed signature.
//!
//! The payout pipeline talks to [`FundingSource`]; [`SettlementClient`]
//! implements it in mock mode (in-memory ledger) or live mode (RPC).

mod client;
mod types;

pub use client::{SettlementClient, SettlementConfig, SettlementMode};
pub use types::*;

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Not authorized: no treasury keypair loaded")]
    NotAuthorized,
}

impl SettlementError {
    /// Errors raised before anything is sent to the ledger
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidAddress(_) | Self::InvalidAmount(_))
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;

/// What the payout pipeline needs from the ledger
#[async_trait]
pub trait FundingSource: Send + Sync {
    /// Lamports available to disburse
    async fn spendable_balance(&self) -> Result<u64>;

    /// Transfer lamports and wait for confirmation
    async fn transfer(&self, destination: &Pubkey, lamports: u64) -> Result<Signature>;

    /// Audit link for a confirmed transfer
    fn explorer_url(&self, signature: &Signature) -> String;
}
