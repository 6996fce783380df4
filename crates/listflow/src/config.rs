use crate::render::{Branding, LogoPosition};

/// Central runtime configuration, loaded once at startup from the
/// environment. Everything the worker, renderer and mail transport need is
/// resolved here and passed into their constructors; nothing is re-read per
/// recipient.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub api_addr: Option<String>,
    pub base_url: String,
    pub cron_secret: Option<String>,
    pub unsubscribe_secret: String,
    pub migrate_on_startup: bool,
    pub mail: MailConfig,
    pub branding: Branding,
    pub pacing: PacingConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    /// SMTP relay host. When unset, sends fall back to local sendmail.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Throttling controls for the send loop. These protect against relay
/// rate-limiting; they are not correctness mechanisms.
#[derive(Clone, Copy, Debug)]
pub struct PacingConfig {
    /// Short pause after every N messages. 0 disables batching.
    pub emails_per_batch: u32,
    /// Fixed delay between individual sends.
    pub delay_between_emails_ms: u64,
    /// Length of the inter-batch pause.
    pub batch_pause_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct DeliveryConfig {
    /// Wall-clock budget for one worker invocation; the loop exits near this
    /// so an external scheduler can restart it.
    pub run_budget_secs: u64,
    /// A processing job whose started_at is older than this is considered
    /// stuck and reset to pending.
    pub stuck_after_secs: i64,
    /// Lazy-poll cadence of the dispatch scheduler.
    pub poll_interval_secs: u64,
    /// Scheduled jobs due within this horizon get an in-process wake-up;
    /// anything further out is left to polling.
    pub schedule_horizon_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let api_addr = env_opt("LISTFLOW_API_ADDR").and_then(|s| normalize_optional_addr(&s));

        let base_url = env_opt("LISTFLOW_BASE_URL")
            .unwrap_or_else(|| "http://localhost".to_string());

        let cron_secret = env_opt("LISTFLOW_CRON_SECRET");

        let unsubscribe_secret = env_opt("LISTFLOW_UNSUBSCRIBE_SECRET")
            .ok_or_else(|| anyhow::anyhow!("LISTFLOW_UNSUBSCRIBE_SECRET is missing"))?;

        let migrate_on_startup = env_bool("LISTFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let mail = MailConfig {
            host: env_opt("LISTFLOW_SMTP_HOST"),
            port: env_opt("LISTFLOW_SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            username: env_opt("LISTFLOW_SMTP_USER"),
            password: env_opt("LISTFLOW_SMTP_PASS"),
            from: env_opt("LISTFLOW_SMTP_FROM")
                .ok_or_else(|| anyhow::anyhow!("LISTFLOW_SMTP_FROM is missing"))?,
        };

        let branding = Branding {
            logo_url: env_opt("LISTFLOW_LOGO_URL"),
            logo_name: env_opt("LISTFLOW_LOGO_NAME"),
            logo_position: env_opt("LISTFLOW_LOGO_POSITION")
                .map(|s| LogoPosition::parse(&s)),
            footer_text: env_opt("LISTFLOW_FOOTER_TEXT"),
            footer_company_name: env_opt("LISTFLOW_FOOTER_COMPANY_NAME"),
            footer_address: env_opt("LISTFLOW_FOOTER_ADDRESS"),
            footer_email: env_opt("LISTFLOW_FOOTER_EMAIL"),
            footer_phone: env_opt("LISTFLOW_FOOTER_PHONE"),
            footer_website_url: env_opt("LISTFLOW_FOOTER_WEBSITE_URL"),
            footer_privacy_url: env_opt("LISTFLOW_FOOTER_PRIVACY_URL"),
        };

        let pacing = PacingConfig {
            emails_per_batch: env_opt("LISTFLOW_EMAILS_PER_BATCH")
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            delay_between_emails_ms: env_opt("LISTFLOW_DELAY_BETWEEN_EMAILS_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            batch_pause_ms: env_opt("LISTFLOW_BATCH_PAUSE_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let delivery = DeliveryConfig {
            run_budget_secs: env_opt("LISTFLOW_RUN_BUDGET_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(240),
            stuck_after_secs: env_opt("LISTFLOW_STUCK_AFTER_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            poll_interval_secs: env_opt("LISTFLOW_POLL_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            schedule_horizon_hours: env_opt("LISTFLOW_SCHEDULE_HORIZON_HOURS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
        };

        Ok(Self {
            database_url,
            api_addr,
            base_url,
            cron_secret,
            unsubscribe_secret,
            migrate_on_startup,
            mail,
            branding,
            pacing,
            delivery,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
