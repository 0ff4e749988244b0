//! Attention Coin Store
//!
//! Persistence for the payout pipeline. [`PayoutStore`] is the seam the
//! pipeline talks to; [`MemoryStore`] backs tests and mock runs and
//! [`PgStore`] backs production.
//!
//! ## Claim protocol
//!
//! Submissions move `approved -> queued` by compare-and-swap before any
//! transfer is attempted. A claimed submission is invisible to every other
//! cycle. It leaves `queued` exactly once: to `paid` together with the
//! completion of the payout record that covers it, or back to `approved`
//! when that record fails, is cancelled, or the cycle aborts.

mod memory;
mod postgres;

pub use memory::{MemoryStore, StoreOp};
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use attention_core::{EligibleSubmission, NewPayoutRecord, PayoutId, PayoutRecord, SubmissionId};
use attention_settings::StoredPayoutConfig;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence operations used by a payout cycle
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Approved submissions with a positive score, joined to their owners,
    /// oldest first
    async fn eligible_submissions(&self) -> Result<Vec<EligibleSubmission>>;

    /// Move `approved -> queued` for each id still approved. Returns the ids
    /// this call actually claimed.
    async fn claim_submissions(&self, ids: &[SubmissionId]) -> Result<Vec<SubmissionId>>;

    /// Move `queued -> approved`. Returns how many were released.
    async fn release_submissions(&self, ids: &[SubmissionId]) -> Result<usize>;

    /// Release claims older than `older_than` that no processing payout
    /// record covers
    async fn release_stale_claims(&self, older_than: Duration) -> Result<usize>;

    /// Persist a new record in `processing`
    async fn create_payout_record(&self, record: NewPayoutRecord) -> Result<PayoutRecord>;

    async fn get_payout_record(&self, id: PayoutId) -> Result<Option<PayoutRecord>>;

    /// Atomically mark the record completed, its submissions paid and add
    /// its amount to the owner's earnings.
    ///
    /// Returns `false` without touching anything when the record is already
    /// terminal.
    async fn complete_payout(&self, id: PayoutId, tx_signature: &str) -> Result<bool>;

    /// Mark the record failed, bump its retry counter and release its
    /// submissions. Returns `false` when the record is already terminal.
    async fn fail_payout(&self, id: PayoutId, error: &str) -> Result<bool>;

    /// Close a record whose transfer was never attempted and release its
    /// submissions. The retry counter is left alone. Returns `false` when the
    /// record is already terminal.
    async fn cancel_payout(&self, id: PayoutId, reason: &str) -> Result<bool>;

    /// Admin-stored payout config row, if any
    async fn load_payout_config(&self) -> Result<Option<StoredPayoutConfig>>;

    /// Failed records whose retry counter is still below `max_retries`
    async fn retryable_failed_payouts(&self, max_retries: u32) -> Result<Vec<PayoutRecord>>;
}
