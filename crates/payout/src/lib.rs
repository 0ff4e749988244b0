//! Attention Coin Payout Pipeline
//!
//! One payout cycle, stage by stage:
//!
//! 1. **Aggregate** approved, unpaid submissions per user ([`aggregate`])
//! 2. **Allocate** each user's proportional share of the budget, capped and
//!    floored ([`calculate_allocations`])
//! 3. **Pre-flight** the treasury balance against the batch total plus a fee
//!    buffer ([`check_balance`])
//! 4. **Disburse** one transfer per recipient on a bounded worker pool
//!    ([`disburse`])
//! 5. **Reconcile** every transfer outcome into the store ([`reconcile`])
//! 6. **Summarize** the batch ([`summarize`])
//!
//! [`PayoutCycle`] wires the stages together and owns the claim protocol.

mod aggregate;
mod allocation;
mod cycle;
mod disburse;
mod error;
mod reconcile;
mod summary;

pub use aggregate::{aggregate, AggregatedUser};
pub use allocation::{calculate_allocations, total_allocated, Allocation};
pub use cycle::{CycleOptions, PayoutCycle};
pub use disburse::{check_balance, disburse, execute_transfer, BalanceCheck, PayoutJob, TransferOutcome, TransferResult};
pub use error::{PayoutError, Result};
pub use reconcile::{reconcile, OutcomeStatus, RecipientOutcome};
pub use summary::summarize;
