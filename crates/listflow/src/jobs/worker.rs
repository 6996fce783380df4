use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use uuid::Uuid;

use crate::audience::AudienceRepo;
use crate::config::PacingConfig;
use crate::jobs::model::{DeliveryJob, JobStatus};
use crate::jobs::repo::{CampaignsRepo, JobsRepo};
use crate::mail::Mailer;
use crate::render::{self, Branding, UnsubscribeSigner};

/// Progress is persisted and cancellation observed every this many
/// successful sends, so at most CHECKPOINT_EVERY - 1 extra messages go out
/// after an external cancel.
const CHECKPOINT_EVERY: i32 = 5;

/// Everything the send path needs besides the repos: branding, link
/// signing, pacing, and the invocation's wall-clock budget. Built once from
/// config at startup.
#[derive(Clone)]
pub struct DeliveryContext {
    pub branding: Branding,
    pub signer: UnsubscribeSigner,
    pub pacing: PacingConfig,
    pub run_budget: Duration,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs_processed: u32,
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { sent: i32 },
    /// The job was cancelled externally mid-send; its row is left in
    /// whatever terminal state the cancellation set.
    Cancelled,
}

/// The delivery control loop: claims the oldest due job, resolves its
/// audience, renders and sends one message at a time, persists progress,
/// and finalizes the job. Single-threaded and synchronous per invocation;
/// concurrency only exists across invocations and is fenced by the atomic
/// claim.
pub struct DeliveryWorker {
    jobs: JobsRepo,
    campaigns: CampaignsRepo,
    audience: AudienceRepo,
    mailer: Arc<dyn Mailer>,
    ctx: DeliveryContext,
}

impl DeliveryWorker {
    pub fn new(
        jobs: JobsRepo,
        campaigns: CampaignsRepo,
        audience: AudienceRepo,
        mailer: Arc<dyn Mailer>,
        ctx: DeliveryContext,
    ) -> Self {
        Self {
            jobs,
            campaigns,
            audience,
            mailer,
            ctx,
        }
    }

    /// Processes due jobs until the queue is drained or the wall-clock
    /// budget runs out. A job that fails is marked `failed` and the loop
    /// moves on; the worker itself never crashes on a bad job.
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        loop {
            if started.elapsed() >= self.ctx.run_budget {
                tracing::info!("run budget reached, exiting so a later invocation can resume");
                summary.budget_exhausted = true;
                break;
            }

            let Some(job) = self.jobs.claim_next_due().await? else {
                break;
            };

            summary.jobs_processed += 1;
            self.dispatch(job).await;
        }

        Ok(summary)
    }

    /// Claims and processes at most one job. Used by the external-cron
    /// entry point. Returns false when nothing was due.
    pub async fn run_one(&self) -> anyhow::Result<bool> {
        let Some(job) = self.jobs.claim_next_due().await? else {
            return Ok(false);
        };
        self.dispatch(job).await;
        Ok(true)
    }

    async fn dispatch(&self, job: DeliveryJob) {
        let job_id = job.id;
        let campaign_id = job.campaign_id;
        match self.process(job).await {
            Ok(JobOutcome::Completed { sent }) => {
                tracing::info!(%job_id, %campaign_id, sent, "job completed");
            }
            Ok(JobOutcome::Cancelled) => {
                tracing::info!(%job_id, %campaign_id, "job cancelled during processing");
            }
            Err(e) => {
                tracing::error!(%job_id, %campaign_id, error = %e, "job failed");
                if let Err(e) = self.jobs.mark_failed(job_id, &e.to_string()).await {
                    tracing::error!(%job_id, error = %e, "could not record job failure");
                }
            }
        }
    }

    async fn process(&self, job: DeliveryJob) -> anyhow::Result<JobOutcome> {
        let campaign = self
            .campaigns
            .get(job.campaign_id)
            .await?
            .ok_or_else(|| anyhow!("campaign {} not found", job.campaign_id))?;

        // Jobs enqueued without explicit targets fall back to the
        // campaign's own list set.
        let list_ids: Vec<Uuid> = if job.list_ids.is_empty() {
            campaign.list_ids.clone()
        } else {
            job.list_ids.clone()
        };

        let recipients = self.audience.resolve(&list_ids).await?;
        let total = recipients.len() as i32;
        self.jobs.set_total(job.id, total).await?;

        if total == 0 {
            // Nothing to send is success, not an error.
            self.jobs.mark_completed(job.id, 0).await?;
            return Ok(JobOutcome::Completed { sent: 0 });
        }

        // Unsubscribe links point at the first targeted list.
        let unsubscribe_list = list_ids[0];
        let pacing = self.ctx.pacing;
        let mut sent: i32 = 0;

        for (idx, recipient) in recipients.iter().enumerate() {
            let payload = render::render(
                &campaign,
                &self.ctx.branding,
                &self.ctx.signer,
                unsubscribe_list,
                recipient,
            );

            match self
                .mailer
                .send(&recipient.email, &payload.subject, &payload.html_body)
                .await
            {
                Ok(()) => {
                    sent += 1;
                    if sent % CHECKPOINT_EVERY == 0 {
                        self.jobs.update_progress(job.id, sent).await?;
                        if !self.still_processing(job.id).await? {
                            return Ok(JobOutcome::Cancelled);
                        }
                    }
                }
                Err(e) => {
                    // One bad address must not block the rest of the
                    // audience. Counted as not-sent, no retry within the job.
                    tracing::warn!(
                        job_id = %job.id,
                        to = %recipient.email,
                        error = %e,
                        "send failed, continuing"
                    );
                }
            }

            let last = idx + 1 == recipients.len();
            if pacing.delay_between_emails_ms > 0 && !last {
                tokio::time::sleep(Duration::from_millis(pacing.delay_between_emails_ms)).await;
            }
            if pacing.emails_per_batch > 0
                && (idx as u32 + 1) % pacing.emails_per_batch == 0
                && !last
            {
                tokio::time::sleep(Duration::from_millis(pacing.batch_pause_ms)).await;
            }
        }

        // A cancel can land between the last checkpoint and here; the
        // guarded completed-update refuses to overwrite it.
        if !self.jobs.mark_completed(job.id, sent).await? {
            return Ok(JobOutcome::Cancelled);
        }
        self.campaigns.mark_sent(campaign.id, sent).await?;

        Ok(JobOutcome::Completed { sent })
    }

    async fn still_processing(&self, job_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .jobs
            .current_status(job_id)
            .await?
            .as_deref()
            == Some(JobStatus::Processing.as_str()))
    }
}
