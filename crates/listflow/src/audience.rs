use sqlx::PgPool;
use uuid::Uuid;

use crate::render::Recipient;

/// Resolves the deduplicated audience for a set of target lists. Pure read;
/// recipients are derived fresh at processing time, never persisted with
/// the job.
#[derive(Clone)]
pub struct AudienceRepo {
    pool: PgPool,
}

impl AudienceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinct union of subscribers who, for at least one of the given
    /// lists, are verified, not globally unsubscribed, and not unsubscribed
    /// from that list. A subscriber on two targeted lists appears once.
    /// Ordered by email for a stable send order. An empty list set or no
    /// eligible subscribers yields an empty vec, which the worker treats as
    /// immediate completion.
    pub async fn resolve(&self, list_ids: &[Uuid]) -> anyhow::Result<Vec<Recipient>> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let emails: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT s.email
            FROM subscribers s
            INNER JOIN subscriber_lists sl ON sl.subscriber_id = s.id
            WHERE sl.list_id = ANY($1)
              AND s.verified
              AND NOT s.unsubscribed
              AND NOT sl.unsubscribed
            ORDER BY s.email ASC
            "#,
        )
        .bind(list_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(emails.into_iter().map(|email| Recipient { email }).collect())
    }
}
