//! In-memory store
//!
//! Same claim and reconciliation semantics as the Postgres store, held in a
//! single `RwLock`. Used by tests and by mock-mode runs without a database.
//! Individual operations can be made to fail with [`MemoryStore::inject_fault`].

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use attention_core::{
    EligibleSubmission, NewPayoutRecord, PayoutId, PayoutRecord, PayoutStatus, Submission,
    SubmissionId, SubmissionStatus, User, UserId,
};
use attention_settings::StoredPayoutConfig;

use crate::{PayoutStore, Result, StoreError};

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Eligible,
    Claim,
    CreateRecord,
    Complete,
    Fail,
    Cancel,
    LoadConfig,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    /// Insertion order
    submissions: Vec<Submission>,
    claimed_at: HashMap<SubmissionId, DateTime<Utc>>,
    records: Vec<PayoutRecord>,
    config: Option<StoredPayoutConfig>,
    /// Calls of each op that still succeed before it starts failing
    faults: HashMap<StoreOp, u32>,
}

impl MemoryState {
    fn check(&mut self, op: StoreOp) -> Result<()> {
        match self.faults.get_mut(&op) {
            Some(0) => Err(StoreError::Database(format!("injected fault: {:?}", op))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_mut(&mut self, id: PayoutId) -> Result<&mut PayoutRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("payout record {}", id)))
    }

    /// Move every listed submission currently in `from` to `to`
    fn transition(&mut self, ids: &[SubmissionId], from: SubmissionStatus, to: SubmissionStatus) -> Vec<SubmissionId> {
        let wanted: HashSet<&SubmissionId> = ids.iter().collect();
        let mut moved = Vec::new();
        for submission in self.submissions.iter_mut() {
            if wanted.contains(&submission.id) && submission.status == from {
                submission.status = to;
                moved.push(submission.id);
            }
        }
        if from == SubmissionStatus::Queued {
            for id in &moved {
                self.claimed_at.remove(id);
            }
        }
        moved
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Seeding ====================

    /// Add a payee
    pub fn insert_user(&self, wallet_address: &str, username: &str) -> UserId {
        let user = User {
            id: Uuid::new_v4(),
            wallet_address: wallet_address.to_string(),
            username: username.to_string(),
            total_earned: 0,
        };
        let id = user.id;
        let mut state = self.state.write().expect("store lock poisoned");
        state.users.insert(id, user);
        id
    }

    /// Add a submission in the given status, submitted now
    pub fn insert_submission(&self, user_id: UserId, score: u64, status: SubmissionStatus) -> SubmissionId {
        self.insert_submission_at(user_id, score, status, Utc::now())
    }

    /// Add a submission with an explicit submission time
    pub fn insert_submission_at(
        &self,
        user_id: UserId,
        score: u64,
        status: SubmissionStatus,
        submitted_at: DateTime<Utc>,
    ) -> SubmissionId {
        let id = Uuid::new_v4();
        let submission = Submission {
            id,
            user_id,
            content_ref: format!("https://x.com/i/status/{}", id.as_u128() % 1_000_000_000),
            score,
            status,
            submitted_at,
        };
        let mut state = self.state.write().expect("store lock poisoned");
        if status == SubmissionStatus::Queued {
            state.claimed_at.insert(id, submitted_at);
        }
        state.submissions.push(submission);
        id
    }

    /// Backdate a claim so it looks abandoned
    pub fn backdate_claim(&self, id: SubmissionId, claimed_at: DateTime<Utc>) {
        let mut state = self.state.write().expect("store lock poisoned");
        state.claimed_at.insert(id, claimed_at);
    }

    pub fn set_payout_config(&self, config: Option<StoredPayoutConfig>) {
        let mut state = self.state.write().expect("store lock poisoned");
        state.config = config;
    }

    /// Make `op` fail until [`Self::clear_fault`]
    pub fn inject_fault(&self, op: StoreOp) {
        self.inject_fault_after(op, 0);
    }

    /// Let `op` succeed `successes` more times, then fail until cleared
    pub fn inject_fault_after(&self, op: StoreOp, successes: u32) {
        let mut state = self.state.write().expect("store lock poisoned");
        state.faults.insert(op, successes);
    }

    pub fn clear_fault(&self, op: StoreOp) {
        let mut state = self.state.write().expect("store lock poisoned");
        state.faults.remove(&op);
    }

    // ==================== Inspection ====================

    pub fn user(&self, id: UserId) -> Option<User> {
        let state = self.state.read().expect("store lock poisoned");
        state.users.get(&id).cloned()
    }

    pub fn submission(&self, id: SubmissionId) -> Option<Submission> {
        let state = self.state.read().expect("store lock poisoned");
        state.submissions.iter().find(|s| s.id == id).cloned()
    }

    /// All payout records, in creation order
    pub fn payout_records(&self) -> Vec<PayoutRecord> {
        let state = self.state.read().expect("store lock poisoned");
        state.records.clone()
    }
}

#[async_trait]
impl PayoutStore for MemoryStore {
    async fn eligible_submissions(&self) -> Result<Vec<EligibleSubmission>> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::Eligible)?;

        let mut rows: Vec<EligibleSubmission> = state
            .submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Approved && s.score > 0)
            .filter_map(|s| {
                let user = state.users.get(&s.user_id)?;
                Some(EligibleSubmission {
                    submission_id: s.id,
                    user_id: s.user_id,
                    wallet_address: user.wallet_address.clone(),
                    username: user.username.clone(),
                    score: s.score,
                    submitted_at: s.submitted_at,
                })
            })
            .collect();
        rows.sort_by_key(|r| r.submitted_at);
        Ok(rows)
    }

    async fn claim_submissions(&self, ids: &[SubmissionId]) -> Result<Vec<SubmissionId>> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::Claim)?;

        let claimed = state.transition(ids, SubmissionStatus::Approved, SubmissionStatus::Queued);
        let now = Utc::now();
        for id in &claimed {
            state.claimed_at.insert(*id, now);
        }
        debug!("Claimed {} of {} submissions", claimed.len(), ids.len());
        Ok(claimed)
    }

    async fn release_submissions(&self, ids: &[SubmissionId]) -> Result<usize> {
        let mut state = self.state.write().expect("store lock poisoned");
        Ok(state.transition(ids, SubmissionStatus::Queued, SubmissionStatus::Approved).len())
    }

    async fn release_stale_claims(&self, older_than: Duration) -> Result<usize> {
        let mut state = self.state.write().expect("store lock poisoned");
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());

        let covered: HashSet<SubmissionId> = state
            .records
            .iter()
            .filter(|r| r.status == PayoutStatus::Processing)
            .flat_map(|r| r.submission_ids.iter().copied())
            .collect();

        let stale: Vec<SubmissionId> = state
            .claimed_at
            .iter()
            .filter(|(id, at)| **at < cutoff && !covered.contains(*id))
            .map(|(id, _)| *id)
            .collect();

        Ok(state.transition(&stale, SubmissionStatus::Queued, SubmissionStatus::Approved).len())
    }

    async fn create_payout_record(&self, record: NewPayoutRecord) -> Result<PayoutRecord> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::CreateRecord)?;

        let record = record.into_record(Uuid::new_v4(), Utc::now());
        state.records.push(record.clone());
        Ok(record)
    }

    async fn get_payout_record(&self, id: PayoutId) -> Result<Option<PayoutRecord>> {
        let state = self.state.read().expect("store lock poisoned");
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn complete_payout(&self, id: PayoutId, tx_signature: &str) -> Result<bool> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::Complete)?;

        let record = state.record_mut(id)?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        let user_id = record.user_id;
        let amount = record.amount;
        let submission_ids = record.submission_ids.clone();

        // Validate the whole unit before mutating so a failure leaves no trace
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }

        let record = state.record_mut(id)?;
        record.status = PayoutStatus::Completed;
        record.tx_signature = Some(tx_signature.to_string());
        record.updated_at = Utc::now();

        state.transition(&submission_ids, SubmissionStatus::Queued, SubmissionStatus::Paid);
        if let Some(user) = state.users.get_mut(&user_id) {
            user.total_earned = user.total_earned.saturating_add(amount);
        }
        Ok(true)
    }

    async fn fail_payout(&self, id: PayoutId, error: &str) -> Result<bool> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::Fail)?;

        let record = state.record_mut(id)?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.status = PayoutStatus::Failed;
        record.error = Some(error.to_string());
        record.retry_count += 1;
        record.updated_at = Utc::now();
        let submission_ids = record.submission_ids.clone();

        state.transition(&submission_ids, SubmissionStatus::Queued, SubmissionStatus::Approved);
        Ok(true)
    }

    async fn cancel_payout(&self, id: PayoutId, reason: &str) -> Result<bool> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::Cancel)?;

        let record = state.record_mut(id)?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.status = PayoutStatus::Cancelled;
        record.error = Some(reason.to_string());
        record.updated_at = Utc::now();
        let submission_ids = record.submission_ids.clone();

        state.transition(&submission_ids, SubmissionStatus::Queued, SubmissionStatus::Approved);
        Ok(true)
    }

    async fn load_payout_config(&self) -> Result<Option<StoredPayoutConfig>> {
        let mut state = self.state.write().expect("store lock poisoned");
        state.check(StoreOp::LoadConfig)?;
        Ok(state.config.clone())
    }

    async fn retryable_failed_payouts(&self, max_retries: u32) -> Result<Vec<PayoutRecord>> {
        let state = self.state.read().expect("store lock poisoned");
        Ok(state
            .records
            .iter()
            .filter(|r| r.status == PayoutStatus::Failed && r.retry_count < max_retries)
            .cloned()
            .collect())
    }
}
