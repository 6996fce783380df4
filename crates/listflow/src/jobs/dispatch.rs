use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::jobs::repo::JobsRepo;
use crate::jobs::worker::DeliveryWorker;

/// Result of a cron-style "process one job and exit" invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronOutcome {
    Processed,
    NoWork,
    /// Another invocation holds the lock; nothing was attempted.
    Locked,
}

/// Starts worker invocations. Four trigger styles converge here:
/// immediate fire-and-forget, delayed wake-up for near-future schedules,
/// periodic polling, and the external-cron single-job entry point.
///
/// A non-blocking mutex keeps at most one in-process invocation active;
/// the job store's atomic claim covers anything that slips past it (for
/// example a second process).
#[derive(Clone)]
pub struct Dispatcher {
    worker: Arc<DeliveryWorker>,
    jobs: JobsRepo,
    lock: Arc<Mutex<()>>,
    stuck_after_secs: i64,
    schedule_horizon: chrono::Duration,
}

impl Dispatcher {
    pub fn new(
        worker: Arc<DeliveryWorker>,
        jobs: JobsRepo,
        stuck_after_secs: i64,
        schedule_horizon_hours: i64,
    ) -> Self {
        Self {
            worker,
            jobs,
            lock: Arc::new(Mutex::new(())),
            stuck_after_secs,
            schedule_horizon: chrono::Duration::hours(schedule_horizon_hours),
        }
    }

    /// Fire-and-forget: spawns a worker invocation and returns immediately.
    /// A no-op when an invocation is already running.
    pub fn trigger(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let Ok(_guard) = this.lock.try_lock() else {
                tracing::debug!("delivery already running, trigger ignored");
                return;
            };
            match this.worker.run().await {
                Ok(summary) => {
                    if summary.jobs_processed > 0 {
                        tracing::info!(
                            jobs = summary.jobs_processed,
                            budget_exhausted = summary.budget_exhausted,
                            "delivery run finished"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "delivery run aborted"),
            }
        });
    }

    /// Arranges a wake-up at roughly the due time for a job scheduled
    /// within the horizon. Jobs further out are left to the poller, which
    /// also covers wake-ups lost to a process restart.
    pub fn schedule_wakeup(&self, due: DateTime<Utc>) {
        let now = Utc::now();
        if due - now > self.schedule_horizon {
            return;
        }
        let delay = (due - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .saturating_add(Duration::from_secs(1));

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.trigger();
        });
    }

    /// Periodic fallback loop: resets stuck jobs and triggers a run when
    /// due or pending work exists. Spawn once at startup.
    pub async fn run_scheduler(&self, poll_interval: Duration) -> anyhow::Result<()> {
        loop {
            match self.jobs.reset_stuck(self.stuck_after_secs).await {
                Ok(n) if n > 0 => tracing::warn!(reset = n, "reset stuck jobs to pending"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "stuck-job check failed"),
            }

            match self.jobs.has_due_work().await {
                Ok(true) => self.trigger(),
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "due-work check failed"),
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// External-cron entry: claim and process a single job, never waiting
    /// on the lock so overlapping cron hits don't both claim work.
    pub async fn run_one(&self) -> anyhow::Result<CronOutcome> {
        let Ok(_guard) = self.lock.try_lock() else {
            return Ok(CronOutcome::Locked);
        };

        if self.worker.run_one().await? {
            Ok(CronOutcome::Processed)
        } else {
            Ok(CronOutcome::NoWork)
        }
    }

    /// Stuck-job recovery on demand (manual trigger endpoint).
    pub async fn reset_stuck(&self) -> anyhow::Result<u64> {
        self.jobs.reset_stuck(self.stuck_after_secs).await
    }
}
