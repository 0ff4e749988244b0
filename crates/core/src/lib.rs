//! Attention Coin Core Types
//!
//! This crate defines the data structures shared by every stage of the
//! payout pipeline: submissions, payees, payout records, batch summaries
//! and lamport conversion helpers.

mod amount;
mod error;
mod summary;
mod types;

pub use amount::*;
pub use error::*;
pub use summary::*;
pub use types::*;
