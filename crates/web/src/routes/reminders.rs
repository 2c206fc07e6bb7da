//! Reminder workflow endpoints
//!
//! `reminder-jobs` schedules a run on the configured substrate; the two run
//! endpoints are the substrate's way back in. Calling a run endpoint again
//! is safe: the engine resumes from the persisted cursor.

use super::super::error::{AppError, Result};
use super::super::state::AppState;
use super::ApiResponse;
use super::subscriptions::find;
use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use subtrack_core::SubscriptionId;
use subtrack_reminders::{RunHandle, RunReport, WorkflowRun};
use tracing::{debug, info};

/// Body of a substrate callback.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
}

/// POST /api/v1/subscriptions/{id}/reminder-jobs
pub async fn create_reminder_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let snapshot = find(&state, &SubscriptionId::new(id)).await?;
    let id = snapshot.subscription.id;

    let handle: RunHandle = state.reminders.create_reminder_job(&id).await?;
    info!(
        subscription_id = %id,
        workflow_run_id = %handle.workflow_run_id,
        "Reminder job created"
    );

    let location = format!(
        "/api/v1/subscriptions/{id}/reminder-jobs/{}",
        handle.workflow_run_id
    );
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ApiResponse::new(handle)),
    ))
}

/// GET /api/v1/subscriptions/{id}/reminder-jobs
pub async fn list_reminder_jobs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<WorkflowRun>>>> {
    let runs = state.reminders.runs(&SubscriptionId::new(id)).await?;
    Ok(Json(ApiResponse::new(runs)))
}

/// POST /api/v1/subscriptions/{id}/reminder-jobs/run
pub async fn run_reminder_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RunReport>>> {
    execute(&state, SubscriptionId::new(id)).await
}

/// POST /api/v1/workflows/subscription/reminder
pub async fn run_reminder_workflow(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RunReport>>> {
    let Json(request) = payload?;
    let id = request
        .subscription_id
        .filter(|id| !id.as_str().trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing subscription id".to_string()))?;
    execute(&state, id).await
}

async fn execute(state: &AppState, id: SubscriptionId) -> Result<Json<ApiResponse<RunReport>>> {
    debug!(subscription_id = %id, "Reminder run requested");
    let report = state.reminders.execute(&id).await?;
    Ok(Json(ApiResponse::new(report)))
}
