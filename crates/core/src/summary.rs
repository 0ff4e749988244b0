//! Batch summary returned to the trigger caller

use serde::{Deserialize, Serialize};

use crate::{BatchId, UserId};

/// Why a single recipient did not end up cleanly paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected locally before any network call (bad address, zero amount)
    Validation,
    /// Ledger rejected or failed to confirm the transfer
    Transfer,
    /// Confirmation did not arrive within the transfer timeout
    Timeout,
    /// Transfer confirmed but the outcome could not be persisted
    Unrecorded,
}

/// Per-recipient error line in a batch summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientError {
    pub user_id: UserId,
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of one payout cycle.
///
/// Always produced, even for cycles that abort before any transfer. In that
/// case every counter is zero and `error` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Lamports transferred by confirmed transfers
    pub total_amount: u64,
    pub duration_ms: u64,
    /// Cycle-level failure (shortfall, data access, configuration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecipientError>,
}

impl BatchSummary {
    /// Summary for a cycle that did nothing
    pub fn empty(batch_id: BatchId, duration_ms: u64) -> Self {
        Self {
            batch_id,
            total_processed: 0,
            successful: 0,
            failed: 0,
            total_amount: 0,
            duration_ms,
            error: None,
            errors: Vec::new(),
        }
    }

    /// Summary for a cycle aborted before disbursement
    pub fn aborted(batch_id: BatchId, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(batch_id, duration_ms)
        }
    }

    /// True when the cycle completed without a cycle-level error and no
    /// recipient failed
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }
}
