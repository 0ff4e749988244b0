//! Reconciliation of transfer outcomes into the store

use tracing::{debug, error, info, warn};

use attention_core::{FailureKind, PayoutRecord, UserId};
use attention_store::PayoutStore;

use crate::{TransferOutcome, TransferResult};

/// What happened to one recipient, as the batch summary sees it
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientOutcome {
    pub user_id: UserId,
    pub amount: u64,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// Transfer confirmed and recorded
    Paid { signature: String },
    /// Transfer did not happen
    Failed { kind: FailureKind, reason: String },
    /// Transfer confirmed, recording it failed
    Unrecorded { signature: String, reason: String },
}

impl RecipientOutcome {
    /// Whether lamports left the treasury
    pub fn transferred(&self) -> bool {
        !matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Apply one transfer result to its payout record.
///
/// Success completes the record, marks its submissions paid and credits the
/// user in one store call. Failure marks the record failed and releases its
/// submissions. Reconciling a record that is already terminal changes
/// nothing.
pub async fn reconcile(
    store: &dyn PayoutStore,
    record: &PayoutRecord,
    result: &TransferResult,
) -> RecipientOutcome {
    let status = match &result.outcome {
        TransferOutcome::Confirmed { signature, explorer_url } => {
            match store.complete_payout(record.id, signature).await {
                Ok(applied) => {
                    if applied {
                        info!(
                            "Paid {} lamports to user {} ({})",
                            record.amount, record.user_id, explorer_url
                        );
                    } else {
                        debug!("Payout record {} already terminal, nothing to do", record.id);
                    }
                    OutcomeStatus::Paid {
                        signature: signature.clone(),
                    }
                }
                Err(e) => {
                    error!(
                        "Transfer succeeded but could not be recorded: batch {} user {} amount {} signature {}: {}",
                        record.batch_id, record.user_id, record.amount, signature, e
                    );
                    OutcomeStatus::Unrecorded {
                        signature: signature.clone(),
                        reason: format!("transfer {} succeeded but could not be recorded: {}", signature, e),
                    }
                }
            }
        }
        TransferOutcome::Failed { kind, reason } => {
            match store.fail_payout(record.id, reason).await {
                Ok(true) => {}
                Ok(false) => debug!("Payout record {} already terminal, nothing to do", record.id),
                Err(e) => {
                    warn!("Could not mark payout record {} failed: {}", record.id, e);
                    // Nothing was sent, so hand the submissions back regardless
                    if let Err(e) = store.release_submissions(&record.submission_ids).await {
                        error!("Could not release submissions of payout record {}: {}", record.id, e);
                    }
                }
            }
            OutcomeStatus::Failed {
                kind: *kind,
                reason: reason.clone(),
            }
        }
    };

    RecipientOutcome {
        user_id: record.user_id,
        amount: record.amount,
        status,
    }
}
