mod common;

use chrono::{Duration, Utc};
use common::{insert_campaign, insert_job, insert_scheduled_job, setup_db};
use listflow::jobs::JobsRepo;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn ten_concurrent_claims_yield_exactly_one_winner() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "race", &[]).await;
    let job_id = insert_job(&pool, campaign, &[]).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(
            async move { repo.claim_next_due().await.unwrap() },
        ));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(job) = handle.await.unwrap() {
            winners += 1;
            assert_eq!(job.id, job_id);
            assert_eq!(job.status, "processing");
            assert!(job.started_at.is_some());
        }
    }

    assert_eq!(winners, 1, "exactly one claimer must win the job");

    let status: String = sqlx::query_scalar("SELECT status FROM delivery_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "processing");
}

#[tokio::test]
#[serial]
async fn scheduled_job_is_not_claimed_before_due_time() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "later", &[]).await;
    let _job = insert_scheduled_job(&pool, campaign, &[], Utc::now() + Duration::hours(1)).await;

    let claimed = repo.claim_next_due().await.unwrap();
    assert!(claimed.is_none(), "future scheduled job must not be claimed");
}

#[tokio::test]
#[serial]
async fn scheduled_job_is_claimed_once_due() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "due", &[]).await;
    let job_id = insert_scheduled_job(&pool, campaign, &[], Utc::now() - Duration::seconds(1)).await;

    let claimed = repo
        .claim_next_due()
        .await
        .unwrap()
        .expect("due scheduled job should be claimed");
    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.status, "processing");
}

#[tokio::test]
#[serial]
async fn claim_order_is_earliest_due_first() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "ordering", &[]).await;

    // Pending job created "now"; scheduled job whose due time is well in
    // the past. COALESCE(scheduled_at, created_at) puts the scheduled one
    // first.
    let pending = insert_job(&pool, campaign, &[]).await;
    let overdue =
        insert_scheduled_job(&pool, campaign, &[], Utc::now() - Duration::minutes(30)).await;

    let first = repo.claim_next_due().await.unwrap().expect("first claim");
    assert_eq!(first.id, overdue);

    let second = repo.claim_next_due().await.unwrap().expect("second claim");
    assert_eq!(second.id, pending);

    assert!(repo.claim_next_due().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn pending_jobs_are_claimed_in_creation_order() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "fifo", &[]).await;

    let older: uuid::Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO delivery_jobs (campaign_id, status, created_at)
        VALUES ($1, 'pending', now() - interval '2 minutes')
        RETURNING id
        "#,
    )
    .bind(campaign)
    .fetch_one(&pool)
    .await
    .unwrap();

    let newer = insert_job(&pool, campaign, &[]).await;

    let first = repo.claim_next_due().await.unwrap().expect("first claim");
    assert_eq!(first.id, older);

    let second = repo.claim_next_due().await.unwrap().expect("second claim");
    assert_eq!(second.id, newer);
}

#[tokio::test]
#[serial]
async fn terminal_jobs_are_never_claimed() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "done", &[]).await;
    for status in ["completed", "failed", "cancelled", "processing"] {
        sqlx::query(
            "INSERT INTO delivery_jobs (campaign_id, status) VALUES ($1, $2)",
        )
        .bind(campaign)
        .bind(status)
        .execute(&pool)
        .await
        .unwrap();
    }

    assert!(repo.claim_next_due().await.unwrap().is_none());
}
