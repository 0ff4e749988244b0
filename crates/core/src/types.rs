use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// User (payee) identifier
pub type UserId = Uuid;

/// Submission identifier
pub type SubmissionId = Uuid;

/// Payout record identifier
pub type PayoutId = Uuid;

/// Identifier grouping every payout record created in one cycle
pub type BatchId = Uuid;

/// Generate a fresh batch identifier
pub fn new_batch_id() -> BatchId {
    Uuid::new_v4()
}

/// Lifecycle of a submission.
///
/// ```text
/// pending ──> approved ──> queued ──> paid
///    │            ^           │
///    v            └───────────┘ (released on failure / abort)
/// rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Awaiting admin review
    Pending,
    /// Reviewed and scored, eligible for the next payout cycle
    Approved,
    /// Claimed by a running payout cycle
    Queued,
    /// Paid out by a confirmed transfer
    Paid,
    /// Rejected by review (terminal)
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Queued => "queued",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Queued)
                | (Queued, Approved)
                | (Queued, Paid)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "queued" => Ok(Self::Queued),
            "paid" => Ok(Self::Paid),
            "rejected" => Ok(Self::Rejected),
            other => Err(CoreError::UnknownSubmissionStatus(other.to_string())),
        }
    }
}

/// Status of a payout record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// Created, transfer not yet resolved
    Processing,
    /// Transfer confirmed on-chain
    Completed,
    /// Transfer failed or was rejected locally
    Failed,
    /// Closed before any transfer was attempted
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal records never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownPayoutStatus(other.to_string())),
        }
    }
}

/// Kind of payout a record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayoutType {
    /// Proportional reward for approved submissions
    #[default]
    SubmissionReward,
}

impl PayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionReward => "submission_reward",
        }
    }
}

impl FromStr for PayoutType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submission_reward" => Ok(Self::SubmissionReward),
            other => Err(CoreError::UnknownPayoutType(other.to_string())),
        }
    }
}

/// A claim that a user created qualifying content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub user_id: UserId,
    /// External content reference (post id or URL)
    pub content_ref: String,
    /// Engagement score assigned at review
    pub score: u64,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
}

/// A payee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Base58 destination address on the funding ledger
    pub wallet_address: String,
    /// Display name (linked X handle)
    pub username: String,
    /// Cumulative lamports received, only ever increased by confirmed transfers
    pub total_earned: u64,
}

/// Flat row produced by the eligibility query (submission joined to its owner)
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleSubmission {
    pub submission_id: SubmissionId,
    pub user_id: UserId,
    pub wallet_address: String,
    pub username: String,
    pub score: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Time range covered by the submissions of one payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PayoutPeriod {
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self { start: ts, end: ts }
    }

    /// Widen the period to include `ts`
    pub fn include(&mut self, ts: DateTime<Utc>) {
        if ts < self.start {
            self.start = ts;
        }
        if ts > self.end {
            self.end = ts;
        }
    }
}

/// One attempted disbursement to one user within one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub user_id: UserId,
    /// Lamports
    pub amount: u64,
    pub payout_type: PayoutType,
    pub status: PayoutStatus,
    pub batch_id: BatchId,
    /// Set only on success
    pub tx_signature: Option<String>,
    /// Set on failure or cancellation
    pub error: Option<String>,
    pub retry_count: u32,
    pub period: PayoutPeriod,
    /// Submissions this payout covers
    pub submission_ids: Vec<SubmissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a payout record (always starts `processing`)
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayoutRecord {
    pub user_id: UserId,
    pub amount: u64,
    pub batch_id: BatchId,
    pub period: PayoutPeriod,
    pub submission_ids: Vec<SubmissionId>,
}

impl NewPayoutRecord {
    /// Materialise the record as it is first persisted
    pub fn into_record(self, id: PayoutId, now: DateTime<Utc>) -> PayoutRecord {
        PayoutRecord {
            id,
            user_id: self.user_id,
            amount: self.amount,
            payout_type: PayoutType::SubmissionReward,
            status: PayoutStatus::Processing,
            batch_id: self.batch_id,
            tx_signature: None,
            error: None,
            retry_count: 0,
            period: self.period,
            submission_ids: self.submission_ids,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_submission_status_transitions() {
        use SubmissionStatus::*;
        assert!(Approved.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Paid));
        assert!(Queued.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_status_string_forms() {
        for status in [
            SubmissionStatus::Pending,
            SubmissionStatus::Approved,
            SubmissionStatus::Queued,
            SubmissionStatus::Paid,
            SubmissionStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<SubmissionStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SubmissionStatus>().is_err());
        assert_eq!("failed".parse::<PayoutStatus>().unwrap(), PayoutStatus::Failed);
        assert_eq!(PayoutType::SubmissionReward.as_str(), "submission_reward");
    }

    #[test]
    fn test_payout_status_terminal() {
        assert!(!PayoutStatus::Processing.is_terminal());
        assert!(PayoutStatus::Completed.is_terminal());
        assert!(PayoutStatus::Failed.is_terminal());
        assert!(PayoutStatus::Cancelled.is_terminal());
        assert_eq!("cancelled".parse::<PayoutStatus>().unwrap(), PayoutStatus::Cancelled);
    }

    #[test]
    fn test_period_include() {
        let t0 = Utc::now();
        let mut period = PayoutPeriod::at(t0);
        period.include(t0 - Duration::hours(2));
        period.include(t0 + Duration::hours(1));
        period.include(t0);
        assert_eq!(period.start, t0 - Duration::hours(2));
        assert_eq!(period.end, t0 + Duration::hours(1));
    }

    #[test]
    fn test_new_record_starts_processing() {
        let now = Utc::now();
        let record = NewPayoutRecord {
            user_id: Uuid::new_v4(),
            amount: 42,
            batch_id: new_batch_id(),
            period: PayoutPeriod::at(now),
            submission_ids: vec![Uuid::new_v4()],
        }
        .into_record(Uuid::new_v4(), now);

        assert_eq!(record.status, PayoutStatus::Processing);
        assert_eq!(record.retry_count, 0);
        assert!(record.tx_signature.is_none());
        assert!(record.error.is_none());
    }
}
