//! Payout cycle orchestration

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use attention_core::{
    lamports_to_sol, new_batch_id, sol_to_lamports, BatchId, BatchSummary, EligibleSubmission,
    SubmissionId,
};
use attention_settings::{PayoutConfig, PayoutLimits, PayoutSettings};
use attention_settlement::FundingSource;
use attention_store::PayoutStore;

use crate::{
    aggregate, calculate_allocations, check_balance, disburse, reconcile, summarize,
    total_allocated, PayoutError, PayoutJob, Result,
};

/// Disbursement tuning for a cycle, resolved from settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// Lamports kept back for network fees
    pub fee_buffer: u64,
    pub concurrency: usize,
    pub transfer_timeout: Duration,
    pub stale_claim_age: Duration,
}

impl CycleOptions {
    pub fn from_settings(settings: &PayoutSettings) -> Result<Self> {
        settings.validate().map_err(|e| PayoutError::Config(e.to_string()))?;
        let fee_buffer = sol_to_lamports(settings.fee_buffer_sol)
            .map_err(|e| PayoutError::Config(format!("fee_buffer_sol: {}", e)))?;
        Ok(Self {
            fee_buffer,
            concurrency: settings.transfer_concurrency,
            transfer_timeout: Duration::from_secs(settings.transfer_timeout_secs),
            stale_claim_age: Duration::from_secs(settings.stale_claim_secs),
        })
    }
}

/// Runs payout cycles against a store and a funding source.
///
/// Only one cycle runs at a time per instance. Across instances the claim
/// protocol keeps cycles from paying the same submission twice.
pub struct PayoutCycle {
    store: Arc<dyn PayoutStore>,
    source: Arc<dyn FundingSource>,
    defaults: PayoutSettings,
    options: CycleOptions,
    running: Mutex<()>,
}

impl PayoutCycle {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        source: Arc<dyn FundingSource>,
        settings: PayoutSettings,
    ) -> Result<Self> {
        let options = CycleOptions::from_settings(&settings)?;
        Ok(Self {
            store,
            source,
            defaults: settings,
            options,
            running: Mutex::new(()),
        })
    }

    pub fn options(&self) -> &CycleOptions {
        &self.options
    }

    /// Effective payout config for the next cycle
    pub async fn effective_config(&self) -> Result<PayoutConfig> {
        let stored = self.store.load_payout_config().await?;
        Ok(PayoutConfig::with_defaults(stored.as_ref(), &self.defaults))
    }

    /// Run one cycle, waiting for any cycle already in progress
    pub async fn run(&self) -> BatchSummary {
        let _guard = self.running.lock().await;
        self.execute().await
    }

    /// Run one cycle unless one is already in progress
    pub async fn try_run(&self) -> Option<BatchSummary> {
        let _guard = self.running.try_lock().ok()?;
        Some(self.execute().await)
    }

    /// Wait until no cycle is running
    pub async fn wait_idle(&self) {
        let _guard = self.running.lock().await;
    }

    async fn execute(&self) -> BatchSummary {
        let batch_id = new_batch_id();
        let started = Instant::now();
        info!("Starting payout cycle {}", batch_id);

        let summary = match self.prepare(batch_id).await {
            Ok(jobs) if jobs.is_empty() => summarize(batch_id, &[], started),
            Ok(jobs) => {
                let store = self.store.as_ref();
                let outcomes = disburse(
                    self.source.as_ref(),
                    &jobs,
                    self.options.concurrency,
                    self.options.transfer_timeout,
                    |job, result| async move { reconcile(store, &job.record, &result).await },
                )
                .await;
                summarize(batch_id, &outcomes, started)
            }
            Err(e) => {
                error!("Payout cycle {} aborted: {}", batch_id, e);
                BatchSummary::aborted(batch_id, started.elapsed().as_millis() as u64, e.to_string())
            }
        };

        info!(
            "Payout cycle {} finished: {} processed, {} paid, {} failed, {} SOL in {}ms",
            batch_id,
            summary.total_processed,
            summary.successful,
            summary.failed,
            lamports_to_sol(summary.total_amount),
            summary.duration_ms
        );
        summary
    }

    /// Everything up to the first transfer. On error nothing has been sent
    /// and every claim this cycle took has been released.
    async fn prepare(&self, batch_id: BatchId) -> Result<Vec<PayoutJob>> {
        let released = self.store.release_stale_claims(self.options.stale_claim_age).await?;
        if released > 0 {
            warn!("Released {} stale submission claims", released);
        }

        let config = self.effective_config().await?;
        let limits = config.limits().map_err(|e| PayoutError::Config(e.to_string()))?;
        debug!(
            "Payout config: budget {} SOL, max {} SOL, min {} SOL",
            config.budget_sol, config.max_per_user_sol, config.min_payout_sol
        );

        let eligible = self.store.eligible_submissions().await?;
        if eligible.is_empty() {
            info!("No eligible submissions");
            return Ok(Vec::new());
        }

        let ids: Vec<SubmissionId> = eligible.iter().map(|s| s.submission_id).collect();
        let claimed: HashSet<SubmissionId> =
            self.store.claim_submissions(&ids).await?.into_iter().collect();
        if claimed.len() < ids.len() {
            debug!("{} submissions claimed by another cycle", ids.len() - claimed.len());
        }
        let eligible: Vec<EligibleSubmission> = eligible
            .into_iter()
            .filter(|s| claimed.contains(&s.submission_id))
            .collect();

        match self.build_jobs(batch_id, &eligible, &limits).await {
            Ok(jobs) => Ok(jobs),
            Err(e) => {
                let claimed: Vec<SubmissionId> = claimed.into_iter().collect();
                if let Err(release_err) = self.store.release_submissions(&claimed).await {
                    error!("Could not release claims of aborted cycle {}: {}", batch_id, release_err);
                }
                Err(e)
            }
        }
    }

    async fn build_jobs(
        &self,
        batch_id: BatchId,
        eligible: &[EligibleSubmission],
        limits: &PayoutLimits,
    ) -> Result<Vec<PayoutJob>> {
        let users = aggregate(eligible)?;
        let allocations = calculate_allocations(&users, limits);

        // Submissions of users below the floor go back to the pool
        let allocated: HashSet<SubmissionId> = allocations
            .iter()
            .flat_map(|a| a.submission_ids.iter().copied())
            .collect();
        let unallocated: Vec<SubmissionId> = eligible
            .iter()
            .map(|s| s.submission_id)
            .filter(|id| !allocated.contains(id))
            .collect();
        if !unallocated.is_empty() {
            self.store.release_submissions(&unallocated).await?;
        }

        info!(
            "{} users eligible, {} above the payout floor",
            users.len(),
            allocations.len()
        );
        if allocations.is_empty() {
            return Ok(Vec::new());
        }

        let total = total_allocated(&allocations);
        check_balance(self.source.as_ref(), total, self.options.fee_buffer)
            .await?
            .ensure_sufficient()?;

        let mut jobs: Vec<PayoutJob> = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            match self.store.create_payout_record(allocation.new_record(batch_id)).await {
                Ok(record) => jobs.push(PayoutJob { record, allocation }),
                Err(e) => {
                    // Nothing was sent, so these never enter the retry queue
                    for job in &jobs {
                        if let Err(cancel_err) = self
                            .store
                            .cancel_payout(job.record.id, "batch aborted before transfer")
                            .await
                        {
                            error!("Could not cancel payout record {}: {}", job.record.id, cancel_err);
                        }
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(jobs)
    }
}
