use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{Campaign, CampaignStatus, DeliveryJob, JobStatus};

/// Durable CRUD over delivery jobs plus the atomic claim the worker loop
/// depends on.
#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Inserts a delivery job and advances the campaign out of draft in the
    /// same transaction: `sent` for an immediate send, `scheduled` when a
    /// due time is given.
    pub async fn enqueue(
        &self,
        campaign_id: Uuid,
        list_ids: &[Uuid],
        scheduled_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let (job_status, campaign_status) = match scheduled_at {
            Some(_) => (JobStatus::Scheduled, CampaignStatus::Scheduled),
            None => (JobStatus::Pending, CampaignStatus::Sent),
        };

        let job_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO delivery_jobs (campaign_id, list_ids, status, scheduled_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(campaign_id)
        .bind(list_ids)
        .bind(job_status.as_str())
        .bind(scheduled_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE campaigns SET status = $2 WHERE id = $1")
            .bind(campaign_id)
            .bind(campaign_status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job_id)
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<DeliveryJob>> {
        let job = sqlx::query_as::<_, DeliveryJob>("SELECT * FROM delivery_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Current status string, re-read from durable storage. The worker polls
    /// this at its progress checkpoints to observe external cancellation.
    pub async fn current_status(&self, job_id: Uuid) -> anyhow::Result<Option<String>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM delivery_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status)
    }

    /// True when a pending job exists or a scheduled job has come due.
    pub async fn has_due_work(&self) -> anyhow::Result<bool> {
        let due: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM delivery_jobs
                WHERE status = 'pending'
                   OR (status = 'scheduled' AND scheduled_at <= now())
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(due)
    }

    // ----------------------------
    // Claim
    // ----------------------------

    /// Claims the single oldest eligible job and moves it to `processing`.
    ///
    /// Eligible: `pending`, or `scheduled` with the due time passed (UTC).
    /// Ordered earliest-due-first by COALESCE(scheduled_at, created_at),
    /// ties broken by creation order. SELECT ... FOR UPDATE SKIP LOCKED
    /// inside one transaction makes the claim atomic against concurrent
    /// worker invocations: two claimers can never get the same row.
    pub async fn claim_next_due(&self) -> anyhow::Result<Option<DeliveryJob>> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, DeliveryJob>(
            r#"
            SELECT *
            FROM delivery_jobs
            WHERE status = 'pending'
               OR (status = 'scheduled' AND scheduled_at <= now())
            ORDER BY COALESCE(scheduled_at, created_at) ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let claimed = sqlx::query_as::<_, DeliveryJob>(
            r#"
            UPDATE delivery_jobs
            SET status = 'processing',
                started_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(claimed))
    }

    // ----------------------------
    // Progress + state transitions
    // ----------------------------

    /// Records the audience size. Set once, at the start of processing.
    pub async fn set_total(&self, job_id: Uuid, total: i32) -> anyhow::Result<()> {
        sqlx::query("UPDATE delivery_jobs SET total = $2 WHERE id = $1 AND total IS NULL")
            .bind(job_id)
            .bind(total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_progress(&self, job_id: Uuid, progress: i32) -> anyhow::Result<()> {
        sqlx::query("UPDATE delivery_jobs SET progress = $2 WHERE id = $1")
            .bind(job_id)
            .bind(progress)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Finalizes a job as completed. Guarded on `processing` so a job that
    /// was cancelled between the worker's last checkpoint and here is never
    /// overwritten back to completed.
    pub async fn mark_completed(&self, job_id: Uuid, progress: i32) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET status = 'completed',
                progress = $2,
                completed_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn mark_failed(&self, job_id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET status = 'failed',
                error = $2,
                completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cancels a not-yet-finished job and reverts its campaign to draft so
    /// it can be edited and re-sent. Returns false when the job had already
    /// reached a terminal state (a fully sent job cannot be un-sent).
    pub async fn cancel(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let campaign_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE delivery_jobs
            SET status = 'cancelled',
                completed_at = now()
            WHERE id = $1
              AND status IN ('pending', 'scheduled', 'processing')
            RETURNING campaign_id
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(campaign_id) = campaign_id else {
            tx.commit().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE campaigns SET status = 'draft' WHERE id = $1")
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ----------------------------
    // Recovery
    // ----------------------------

    /// Resets jobs stuck in `processing` (started longer ago than the grace
    /// period) back to `pending` so the next invocation picks them up.
    /// At-least-once by design: recipients sent before the crash may be
    /// sent again.
    pub async fn reset_stuck(&self, grace_secs: i64) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET status = 'pending',
                started_at = NULL
            WHERE status = 'processing'
              AND started_at IS NOT NULL
              AND started_at < now() - ($1::bigint * interval '1 second')
            "#,
        )
        .bind(grace_secs)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

#[derive(Clone)]
pub struct CampaignsRepo {
    pool: PgPool,
}

impl CampaignsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        subject: &str,
        body: &str,
        list_ids: &[Uuid],
    ) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO campaigns (subject, body, list_ids, status)
            VALUES ($1, $2, $3, 'draft')
            RETURNING id
            "#,
        )
        .bind(subject)
        .bind(body)
        .bind(list_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(campaign)
    }

    /// Final aggregate update, written by the worker on job completion.
    pub async fn mark_sent(&self, id: Uuid, sent_count: i32) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_count = $2,
                status = 'sent',
                sent_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
