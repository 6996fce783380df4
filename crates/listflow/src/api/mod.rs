use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::dispatch::{CronOutcome, Dispatcher};
use crate::jobs::repo::{CampaignsRepo, JobsRepo};

#[derive(Clone)]
pub struct ApiState {
    pub jobs: JobsRepo,
    pub campaigns: CampaignsRepo,
    pub dispatcher: Dispatcher,
    pub cron_secret: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Enqueue + status polling
        .route("/jobs", post(enqueue_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        // Trigger surfaces
        .route("/trigger", post(trigger_worker))
        .route("/cron", get(cron))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

fn internal_err(e: anyhow::Error) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("internal error: {e}"),
    )
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub list_ids: Vec<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: Uuid,
}

pub async fn enqueue_job(
    State(state): State<ApiState>,
    Json(body): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, (StatusCode, String)> {
    let campaign = state
        .campaigns
        .get(body.campaign_id)
        .await
        .map_err(internal_err)?;
    if campaign.is_none() {
        return Err((StatusCode::NOT_FOUND, "campaign not found".into()));
    }

    let job_id = state
        .jobs
        .enqueue(body.campaign_id, &body.list_ids, body.scheduled_at)
        .await
        .map_err(internal_err)?;

    match body.scheduled_at {
        None => state.dispatcher.trigger(),
        Some(due) => state.dispatcher.schedule_wakeup(due),
    }

    Ok(Json(EnqueueResponse { job_id }))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub status: String,
    pub progress: i32,
    pub total: Option<i32>,
    pub error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, (StatusCode, String)> {
    let job = state
        .jobs
        .get_job(id)
        .await
        .map_err(internal_err)?
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        campaign_id: job.campaign_id,
        status: job.status,
        progress: job.progress,
        total: job.total,
        error: job.error,
        scheduled_at: job.scheduled_at,
        created_at: job.created_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if state.jobs.get_job(id).await.map_err(internal_err)?.is_none() {
        return Err((StatusCode::NOT_FOUND, "job not found".into()));
    }

    let cancelled = state.jobs.cancel(id).await.map_err(internal_err)?;
    if cancelled {
        Ok((StatusCode::OK, Json(CancelResponse { cancelled: true })))
    } else {
        // Already completed/failed/cancelled; a fully sent job cannot be
        // cancelled retroactively.
        Ok((
            StatusCode::CONFLICT,
            Json(CancelResponse { cancelled: false }),
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
    pub reset_stuck: u64,
}

/// Manual "start processing now" action. Resets stuck jobs, fires a
/// background worker invocation, and acknowledges immediately without
/// waiting for completion.
pub async fn trigger_worker(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let reset_stuck = state.dispatcher.reset_stuck().await.map_err(internal_err)?;
    state.dispatcher.trigger();

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            triggered: true,
            reset_stuck,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CronQuery {
    pub key: Option<String>,
}

/// External scheduler entry point: processes one job and returns. Guarded
/// by the shared cron secret and a non-blocking lock so overlapping
/// invocations do not both claim work.
pub async fn cron(
    State(state): State<ApiState>,
    Query(q): Query<CronQuery>,
) -> impl IntoResponse {
    let authorized = match &state.cron_secret {
        Some(secret) => q.key.as_deref() == Some(secret.as_str()),
        None => false,
    };
    if !authorized {
        return (StatusCode::FORBIDDEN, "Forbidden: invalid cron key").into_response();
    }

    match state.dispatcher.run_one().await {
        Ok(CronOutcome::Processed) => (StatusCode::OK, "ok").into_response(),
        Ok(CronOutcome::NoWork) => (StatusCode::OK, "Success: no pending jobs").into_response(),
        Ok(CronOutcome::Locked) => (
            StatusCode::LOCKED,
            "Error: process locked (another instance running)",
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cron error: {e}"),
        )
            .into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
