//! Batch disbursement
//!
//! One transfer per recipient, at most `concurrency` in flight, each bounded
//! by a timeout. A failed recipient never affects the others. Results come
//! back in job order regardless of completion order.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use attention_core::{FailureKind, PayoutRecord, UserId};
use attention_settlement::{parse_destination, FundingSource, SettlementError};

use crate::{Allocation, PayoutError, Result};

/// A persisted record and the allocation it pays
#[derive(Debug, Clone)]
pub struct PayoutJob {
    pub record: PayoutRecord,
    pub allocation: Allocation,
}

/// How a single transfer ended
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Confirmed by the ledger
    Confirmed {
        signature: String,
        explorer_url: String,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

/// Result of one recipient's transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub user_id: UserId,
    pub amount: u64,
    pub outcome: TransferOutcome,
}

impl TransferResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Confirmed { .. })
    }

    fn failed(allocation: &Allocation, kind: FailureKind, reason: String) -> Self {
        Self {
            user_id: allocation.user_id,
            amount: allocation.amount,
            outcome: TransferOutcome::Failed { kind, reason },
        }
    }
}

/// Treasury balance against what the batch needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceCheck {
    pub available: u64,
    pub allocated: u64,
    pub fee_buffer: u64,
}

impl BalanceCheck {
    pub fn required(&self) -> u64 {
        self.allocated.saturating_add(self.fee_buffer)
    }

    pub fn is_sufficient(&self) -> bool {
        self.available >= self.required()
    }

    /// `Err` naming the shortfall when the balance does not cover the batch
    pub fn ensure_sufficient(&self) -> Result<()> {
        if self.is_sufficient() {
            return Ok(());
        }
        Err(PayoutError::InsufficientBalance {
            available: self.available,
            required: self.required(),
            allocated: self.allocated,
            fee_buffer: self.fee_buffer,
        })
    }
}

/// Read the spendable balance and compare it to `allocated + fee_buffer`
pub async fn check_balance(
    source: &dyn FundingSource,
    allocated: u64,
    fee_buffer: u64,
) -> Result<BalanceCheck> {
    let available = source.spendable_balance().await?;
    let check = BalanceCheck {
        available,
        allocated,
        fee_buffer,
    };
    debug!(
        "Balance check: available {} required {} ({})",
        available,
        check.required(),
        if check.is_sufficient() { "ok" } else { "short" }
    );
    Ok(check)
}

/// Validate, send and await one transfer
pub async fn execute_transfer(
    source: &dyn FundingSource,
    allocation: &Allocation,
    timeout: Duration,
) -> TransferResult {
    // Local validation first, no network call on failure
    let destination = match parse_destination(&allocation.wallet_address) {
        Ok(pubkey) => pubkey,
        Err(e) => return TransferResult::failed(allocation, FailureKind::Validation, e.to_string()),
    };
    if allocation.amount == 0 {
        let e = SettlementError::InvalidAmount(allocation.amount);
        return TransferResult::failed(allocation, FailureKind::Validation, e.to_string());
    }

    match tokio::time::timeout(timeout, source.transfer(&destination, allocation.amount)).await {
        Ok(Ok(signature)) => TransferResult {
            user_id: allocation.user_id,
            amount: allocation.amount,
            outcome: TransferOutcome::Confirmed {
                signature: signature.to_string(),
                explorer_url: source.explorer_url(&signature),
            },
        },
        Ok(Err(e)) => {
            let kind = if e.is_validation() {
                FailureKind::Validation
            } else {
                FailureKind::Transfer
            };
            warn!("Transfer to {} failed: {}", allocation.username, e);
            TransferResult::failed(allocation, kind, e.to_string())
        }
        Err(_) => {
            warn!("Transfer to {} timed out after {:?}", allocation.username, timeout);
            TransferResult::failed(
                allocation,
                FailureKind::Timeout,
                format!("confirmation timed out after {}s", timeout.as_secs()),
            )
        }
    }
}

/// Run every job's transfer, handing each result to `on_result` as soon as
/// it lands.
///
/// At most `concurrency` jobs are in flight. The returned values follow job
/// order.
pub async fn disburse<'a, F, Fut, R>(
    source: &dyn FundingSource,
    jobs: &'a [PayoutJob],
    concurrency: usize,
    timeout: Duration,
    on_result: F,
) -> Vec<R>
where
    F: Fn(&'a PayoutJob, TransferResult) -> Fut,
    Fut: Future<Output = R>,
{
    let on_result = &on_result;
    // Futures are built up front: a stream that owns a borrowing closure makes
    // the caller's future lose `Send`
    let pending: Vec<_> = jobs
        .iter()
        .map(|job| async move {
            let result = execute_transfer(source, &job.allocation, timeout).await;
            on_result(job, result).await
        })
        .collect();

    stream::iter(pending)
        .buffered(concurrency.max(1))
        .collect()
        .await
}
