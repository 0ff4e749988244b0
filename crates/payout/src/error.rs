use thiserror::Error;

use attention_core::UserId;
use attention_settlement::SettlementError;
use attention_store::StoreError;

/// Cycle-level failures. Any of these aborts the cycle before transfers.
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data access error: {0}")]
    Store(#[from] StoreError),

    #[error("Funding source error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Invalid submission data: score total for user {user_id} overflows")]
    ScoreOverflow { user_id: UserId },

    #[error("Insufficient treasury balance: available {available} lamports, required {required} lamports ({allocated} allocated + {fee_buffer} fee buffer)")]
    InsufficientBalance {
        available: u64,
        required: u64,
        allocated: u64,
        fee_buffer: u64,
    },
}

pub type Result<T> = std::result::Result<T, PayoutError>;
