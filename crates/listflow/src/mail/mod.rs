//! Mail transport: one complete SMTP session per message.
//!
//! No pooling or pipelining; sending is already rate-limited by the
//! worker's pacing controls, so the per-call handshake cost is acceptable.

use async_trait::async_trait;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("smtp error: {0}")]
    Smtp(String),
    #[error("sendmail error: {0}")]
    Sendmail(String),
}

/// Per-message send interface. Implementations must treat each call as an
/// independent delivery attempt; the worker counts failures and moves on.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError>;
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    /// Local submission fallback when no relay host is configured.
    /// Best-effort and untracked.
    Sendmail(AsyncSendmailTransport<Tokio1Executor>),
}

pub struct SmtpMailer {
    transport: Transport,
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport from the relay settings. TLS is selected by
    /// port: 465 implicit TLS, 587 STARTTLS, anything else plaintext --
    /// local/loopback test relays (e.g. MailHog on 1025) do not speak TLS.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let transport = match config.host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => {
                let mut builder = match config.port {
                    465 => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                        .map_err(|e| MailError::Smtp(e.to_string()))?,
                    587 => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .map_err(|e| MailError::Smtp(e.to_string()))?,
                    _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
                };
                builder = builder.port(config.port);

                if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                    if !user.is_empty() && !pass.is_empty() {
                        builder =
                            builder.credentials(Credentials::new(user.clone(), pass.clone()));
                    }
                }

                Transport::Smtp(builder.build())
            }
            None => Transport::Sendmail(AsyncSendmailTransport::new()),
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        let to: Mailbox = to
            .parse()
            .map_err(|_| MailError::InvalidAddress(to.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .reply_to(self.from.clone())
            .to(to)
            .subject(subject)
            .singlepart(SinglePart::html(html_body.to_string()))
            .map_err(|e| MailError::Build(e.to_string()))?;

        match &self.transport {
            Transport::Smtp(t) => t
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| MailError::Smtp(e.to_string())),
            Transport::Sendmail(t) => t
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| MailError::Sendmail(e.to_string())),
        }
    }
}
