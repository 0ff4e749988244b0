//! Postgres store
//!
//! Runtime-checked `sqlx` queries against the schema in `migrations/`.
//! Lamport amounts and scores are `BIGINT` and converted at the boundary.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use attention_core::{
    EligibleSubmission, NewPayoutRecord, PayoutId, PayoutPeriod, PayoutRecord, PayoutStatus,
    SubmissionId,
};
use attention_settings::StoredPayoutConfig;

use crate::{PayoutStore, Result, StoreError};

const RECORD_COLUMNS: &str = "id, user_id, amount, payout_type, status, batch_id, tx_signature, \
     error, retry_count, period_start, period_end, submission_ids, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct EligibleRow {
    submission_id: Uuid,
    user_id: Uuid,
    wallet_address: String,
    username: String,
    score: i64,
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PayoutRecordRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    payout_type: String,
    status: String,
    batch_id: Uuid,
    tx_signature: Option<String>,
    error: Option<String>,
    retry_count: i32,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    submission_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PayoutConfigRow {
    budget_sol: Option<f64>,
    max_per_user_sol: Option<f64>,
    min_payout_sol: Option<f64>,
}

impl TryFrom<EligibleRow> for EligibleSubmission {
    type Error = StoreError;

    fn try_from(row: EligibleRow) -> Result<Self> {
        Ok(EligibleSubmission {
            submission_id: row.submission_id,
            user_id: row.user_id,
            wallet_address: row.wallet_address,
            username: row.username,
            score: to_u64("score", row.score)?,
            submitted_at: row.submitted_at,
        })
    }
}

impl TryFrom<PayoutRecordRow> for PayoutRecord {
    type Error = StoreError;

    fn try_from(row: PayoutRecordRow) -> Result<Self> {
        Ok(PayoutRecord {
            id: row.id,
            user_id: row.user_id,
            amount: to_u64("amount", row.amount)?,
            payout_type: row.payout_type.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            batch_id: row.batch_id,
            tx_signature: row.tx_signature,
            error: row.error,
            retry_count: u32::try_from(row.retry_count)
                .map_err(|_| StoreError::Corrupt(format!("retry_count {}", row.retry_count)))?,
            period: PayoutPeriod {
                start: row.period_start,
                end: row.period_end,
            },
            submission_ids: row.submission_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_u64(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} {}", column, value)))
}

fn to_i64(column: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} {} exceeds BIGINT", column, value)))
}

fn corrupt(e: attention_core::CoreError) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

/// Store backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `url`
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to Postgres (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    async fn record_exists(&self, id: PayoutId) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM payout_records WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0)
    }

    /// Move a processing record to `status` and release its submissions in
    /// one transaction
    async fn close_record(
        &self,
        id: PayoutId,
        status: PayoutStatus,
        error: &str,
        retry_increment: i32,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(Vec<Uuid>,)> = sqlx::query_as(
            "UPDATE payout_records \
             SET status = $2, error = $3, retry_count = retry_count + $4, updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING submission_ids",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(retry_increment)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((submission_ids,)) = updated else {
            tx.rollback().await?;
            if self.record_exists(id).await? {
                return Ok(false);
            }
            return Err(StoreError::NotFound(format!("payout record {}", id)));
        };

        sqlx::query(
            "UPDATE submissions SET status = 'approved', claimed_at = NULL \
             WHERE id = ANY($1) AND status = 'queued'",
        )
        .bind(&submission_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Payout record {} -> {} ({} submissions released)", id, status, submission_ids.len());
        Ok(true)
    }
}

#[async_trait]
impl PayoutStore for PgStore {
    async fn eligible_submissions(&self) -> Result<Vec<EligibleSubmission>> {
        let rows: Vec<EligibleRow> = sqlx::query_as(
            "SELECT s.id AS submission_id, s.user_id, u.wallet_address, u.username, s.score, s.submitted_at \
             FROM submissions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.status = 'approved' AND s.score > 0 \
             ORDER BY s.submitted_at, s.id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EligibleSubmission::try_from).collect()
    }

    async fn claim_submissions(&self, ids: &[SubmissionId]) -> Result<Vec<SubmissionId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let claimed: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE submissions SET status = 'queued', claimed_at = now() \
             WHERE id = ANY($1) AND status = 'approved' \
             RETURNING id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        debug!("Claimed {} of {} submissions", claimed.len(), ids.len());
        Ok(claimed.into_iter().map(|(id,)| id).collect())
    }

    async fn release_submissions(&self, ids: &[SubmissionId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE submissions SET status = 'approved', claimed_at = NULL \
             WHERE id = ANY($1) AND status = 'queued'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn release_stale_claims(&self, older_than: Duration) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE submissions s SET status = 'approved', claimed_at = NULL \
             WHERE s.status = 'queued' \
               AND s.claimed_at < now() - make_interval(secs => $1) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM payout_records p \
                   WHERE p.status = 'processing' AND s.id = ANY(p.submission_ids) \
               )",
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn create_payout_record(&self, record: NewPayoutRecord) -> Result<PayoutRecord> {
        let amount = to_i64("amount", record.amount)?;
        let row: PayoutRecordRow = sqlx::query_as(&format!(
            "INSERT INTO payout_records \
                 (id, user_id, amount, payout_type, status, batch_id, retry_count, \
                  period_start, period_end, submission_ids) \
             VALUES ($1, $2, $3, 'submission_reward', 'processing', $4, 0, $5, $6, $7) \
             RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(amount)
        .bind(record.batch_id)
        .bind(record.period.start)
        .bind(record.period.end)
        .bind(&record.submission_ids)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_payout_record(&self, id: PayoutId) -> Result<Option<PayoutRecord>> {
        let row: Option<PayoutRecordRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payout_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PayoutRecord::try_from).transpose()
    }

    async fn complete_payout(&self, id: PayoutId, tx_signature: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated: Option<(Uuid, i64, Vec<Uuid>)> = sqlx::query_as(
            "UPDATE payout_records \
             SET status = 'completed', tx_signature = $2, updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
             RETURNING user_id, amount, submission_ids",
        )
        .bind(id)
        .bind(tx_signature)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, amount, submission_ids)) = updated else {
            tx.rollback().await?;
            if self.record_exists(id).await? {
                return Ok(false);
            }
            return Err(StoreError::NotFound(format!("payout record {}", id)));
        };

        sqlx::query(
            "UPDATE submissions SET status = 'paid', claimed_at = NULL \
             WHERE id = ANY($1) AND status = 'queued'",
        )
        .bind(&submission_ids)
        .execute(&mut *tx)
        .await?;

        let earned = sqlx::query("UPDATE users SET total_earned = total_earned + $2 WHERE id = $1")
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
        if earned.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn fail_payout(&self, id: PayoutId, error: &str) -> Result<bool> {
        self.close_record(id, PayoutStatus::Failed, error, 1).await
    }

    async fn cancel_payout(&self, id: PayoutId, reason: &str) -> Result<bool> {
        self.close_record(id, PayoutStatus::Cancelled, reason, 0).await
    }

    async fn load_payout_config(&self) -> Result<Option<StoredPayoutConfig>> {
        let row: Option<PayoutConfigRow> = sqlx::query_as(
            "SELECT budget_sol, max_per_user_sol, min_payout_sol FROM payout_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredPayoutConfig {
            budget_sol: r.budget_sol,
            max_per_user_sol: r.max_per_user_sol,
            min_payout_sol: r.min_payout_sol,
        }))
    }

    async fn retryable_failed_payouts(&self, max_retries: u32) -> Result<Vec<PayoutRecord>> {
        let max_retries = i32::try_from(max_retries).unwrap_or(i32::MAX);
        let rows: Vec<PayoutRecordRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payout_records \
             WHERE status = 'failed' AND retry_count < $1 \
             ORDER BY created_at",
            RECORD_COLUMNS
        ))
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PayoutRecord::try_from).collect()
    }
}
