mod common;

use chrono::{Duration, Utc};
use common::{insert_campaign, setup_db};
use listflow::jobs::JobsRepo;
use serial_test::serial;

async fn campaign_status(pool: &sqlx::PgPool, id: uuid::Uuid) -> String {
    sqlx::query_scalar("SELECT status FROM campaigns WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn immediate_enqueue_creates_pending_job_and_marks_campaign_sent() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "now", &[]).await;
    let job_id = repo.enqueue(campaign, &[], None).await.unwrap();

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "pending");
    assert!(job.scheduled_at.is_none());
    assert_eq!(job.progress, 0);
    assert!(job.total.is_none());

    assert_eq!(campaign_status(&pool, campaign).await, "sent");
}

#[tokio::test]
#[serial]
async fn scheduled_enqueue_creates_scheduled_job_and_campaign() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let due = Utc::now() + Duration::hours(2);
    let campaign = insert_campaign(&pool, "later", &[]).await;
    let job_id = repo.enqueue(campaign, &[], Some(due)).await.unwrap();

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "scheduled");
    let stored = job.scheduled_at.expect("scheduled_at must be set");
    assert!((stored - due).num_seconds().abs() < 1);

    assert_eq!(campaign_status(&pool, campaign).await, "scheduled");
}

#[tokio::test]
#[serial]
async fn cancelling_a_scheduled_job_reverts_the_campaign_to_draft() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let campaign = insert_campaign(&pool, "undo", &[]).await;
    let job_id = repo
        .enqueue(campaign, &[], Some(Utc::now() + Duration::hours(1)))
        .await
        .unwrap();

    assert!(repo.cancel(job_id).await.unwrap());

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "cancelled");
    assert!(job.completed_at.is_some());

    assert_eq!(campaign_status(&pool, campaign).await, "draft");

    // A cancelled job is terminal; cancelling again reports false.
    assert!(!repo.cancel(job_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn enqueue_stores_explicit_target_lists() {
    let pool = setup_db().await;
    let repo = JobsRepo::new(pool.clone());

    let targets = vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()];
    let campaign = insert_campaign(&pool, "targets", &targets).await;
    let job_id = repo.enqueue(campaign, &targets, None).await.unwrap();

    let job = repo.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.list_ids, targets);
}
