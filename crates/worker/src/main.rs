use std::sync::Arc;
use std::time::Duration;

use listflow::api;
use listflow::audience::AudienceRepo;
use listflow::config::Config;
use listflow::db;
use listflow::jobs::{CampaignsRepo, DeliveryContext, DeliveryWorker, Dispatcher, JobsRepo};
use listflow::mail::SmtpMailer;
use listflow::render::UnsubscribeSigner;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        api = cfg.api_addr.as_deref().unwrap_or("disabled"),
        smtp_host = cfg.mail.host.as_deref().unwrap_or("sendmail"),
        smtp_port = cfg.mail.port,
        cron_auth = if cfg.cron_secret.is_some() { "enabled" } else { "disabled" },
        migrate_on_startup = cfg.migrate_on_startup,
        poll_interval_secs = cfg.delivery.poll_interval_secs,
        "listflow starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let jobs_repo = JobsRepo::new(pool.clone());
    let campaigns_repo = CampaignsRepo::new(pool.clone());
    let audience_repo = AudienceRepo::new(pool.clone());

    let mailer = Arc::new(SmtpMailer::from_config(&cfg.mail)?);

    let worker = Arc::new(DeliveryWorker::new(
        jobs_repo.clone(),
        campaigns_repo.clone(),
        audience_repo,
        mailer,
        DeliveryContext {
            branding: cfg.branding.clone(),
            signer: UnsubscribeSigner::new(cfg.base_url.clone(), cfg.unsubscribe_secret.clone()),
            pacing: cfg.pacing,
            run_budget: Duration::from_secs(cfg.delivery.run_budget_secs),
        },
    ));

    let dispatcher = Dispatcher::new(
        worker,
        jobs_repo.clone(),
        cfg.delivery.stuck_after_secs,
        cfg.delivery.schedule_horizon_hours,
    );

    // ---- API task ----
    let api_state = api::ApiState {
        jobs: jobs_repo,
        campaigns: campaigns_repo,
        dispatcher: dispatcher.clone(),
        cron_secret: cfg.cron_secret.clone(),
    };
    let app = api::router(api_state);
    let api_addr = cfg.api_addr.clone();

    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Scheduler task: stuck-job recovery + due-work polling ----
    let poll_interval = Duration::from_secs(cfg.delivery.poll_interval_secs);
    let scheduler_handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run_scheduler(poll_interval).await })
    };

    // Pick up anything left over from before the restart.
    dispatcher.trigger();

    tokio::select! {
        res = api_handle => res??,
        res = scheduler_handle => res??,
    }

    Ok(())
}
