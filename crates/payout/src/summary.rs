//! Cycle summary

use std::time::Instant;

use attention_core::{BatchId, BatchSummary, FailureKind, RecipientError};

use crate::{OutcomeStatus, RecipientOutcome};

/// Fold recipient outcomes into a batch summary.
///
/// Unrecorded transfers count as successful (the lamports moved) and are
/// also listed in `errors` so an operator can repair the record.
pub fn summarize(batch_id: BatchId, outcomes: &[RecipientOutcome], started: Instant) -> BatchSummary {
    let mut summary = BatchSummary::empty(batch_id, started.elapsed().as_millis() as u64);
    summary.total_processed = outcomes.len();

    for outcome in outcomes {
        match &outcome.status {
            OutcomeStatus::Paid { .. } => {
                summary.successful += 1;
                summary.total_amount = summary.total_amount.saturating_add(outcome.amount);
            }
            OutcomeStatus::Unrecorded { reason, .. } => {
                summary.successful += 1;
                summary.total_amount = summary.total_amount.saturating_add(outcome.amount);
                summary.errors.push(RecipientError {
                    user_id: outcome.user_id,
                    kind: FailureKind::Unrecorded,
                    reason: reason.clone(),
                });
            }
            OutcomeStatus::Failed { kind, reason } => {
                summary.failed += 1;
                summary.errors.push(RecipientError {
                    user_id: outcome.user_id,
                    kind: *kind,
                    reason: reason.clone(),
                });
            }
        }
    }

    summary
}
