//! REST API routes
//!
//! ## Route Structure
//!
//! - `GET /health` - Health check endpoint
//! - `POST /api/v1/subscriptions` - Create a subscription and schedule its reminders
//! - `GET /api/v1/subscriptions/{id}` - Fetch a subscription
//! - `DELETE /api/v1/subscriptions/{id}` - Delete a subscription
//! - `PUT /api/v1/subscriptions/{id}/cancel` - Cancel a subscription
//! - `POST /api/v1/subscriptions/{id}/reminder-jobs` - Schedule a reminder run
//! - `GET /api/v1/subscriptions/{id}/reminder-jobs` - List reminder runs
//! - `POST /api/v1/subscriptions/{id}/reminder-jobs/run` - Start or resume a run
//! - `POST /api/v1/workflows/subscription/reminder` - Same, id taken from the body
//!
//! The two run endpoints are what the workflow substrate calls back.

use super::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use serde::Serialize;

pub mod health;
pub mod reminders;
pub mod subscriptions;

/// Success envelope: `{success: true, data}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Create the API router. Apply state with `.with_state(state)`.
pub fn create_router() -> Router<AppState> {
    let api_routes = Router::new()
        .route("/subscriptions", post(subscriptions::create_subscription))
        .route(
            "/subscriptions/{id}",
            get(subscriptions::get_subscription).delete(subscriptions::delete_subscription),
        )
        .route(
            "/subscriptions/{id}/cancel",
            put(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/{id}/reminder-jobs",
            post(reminders::create_reminder_job).get(reminders::list_reminder_jobs),
        )
        .route(
            "/subscriptions/{id}/reminder-jobs/run",
            post(reminders::run_reminder_job),
        )
        .route(
            "/workflows/subscription/reminder",
            post(reminders::run_reminder_workflow),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
}
