//! Subscription endpoints

use super::super::error::{AppError, Result};
use super::super::state::AppState;
use super::ApiResponse;
use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use subtrack_core::{
    NewSubscription, OwnerContact, Subscription, SubscriptionId, SubscriptionSnapshot,
    SubscriptionStatus,
};
use subtrack_reminders::SubscriptionStore;
use tracing::info;

/// Subscription input plus the owner it belongs to.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    #[serde(flatten)]
    pub subscription: NewSubscription,
    pub user: OwnerContact,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub workflow_run_id: Option<String>,
}

/// POST /api/v1/subscriptions
///
/// The reminder run is scheduled after the subscription is stored; a
/// scheduling failure leaves `workflowRunId` null and still answers 201.
pub async fn create_subscription(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload?;
    let id = SubscriptionId::generate();
    let subscription = request
        .subscription
        .validate(id.clone(), request.user.id.clone(), state.now())?;

    state
        .subscriptions
        .save_subscription(&SubscriptionSnapshot {
            subscription: subscription.clone(),
            owner: request.user,
        })
        .await?;

    let workflow_run_id = state
        .reminders
        .on_subscription_created(&id)
        .await
        .map(|handle| handle.workflow_run_id);

    info!(
        subscription_id = %id,
        renewal_date = %subscription.renewal_date,
        workflow_run_id = ?workflow_run_id,
        "Subscription created"
    );

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v1/subscriptions/{id}"))],
        Json(ApiResponse::new(CreatedSubscription {
            subscription,
            workflow_run_id,
        })),
    ))
}

/// GET /api/v1/subscriptions/{id}
///
/// An active subscription whose renewal date has passed reads as expired.
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Subscription>>> {
    let SubscriptionSnapshot { subscription, .. } = find(&state, &SubscriptionId::new(id)).await?;
    let status = subscription.status_at(state.now());
    Ok(Json(ApiResponse::new(Subscription {
        status,
        ..subscription
    })))
}

/// PUT /api/v1/subscriptions/{id}/cancel
///
/// Pending reminders for the subscription abort on their next wake-up.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Subscription>>> {
    let id = SubscriptionId::new(id);
    let subscription = state
        .subscriptions
        .set_status(&id, SubscriptionStatus::Canceled, state.now())
        .await?
        .ok_or_else(not_found)?;
    info!(subscription_id = %id, "Subscription canceled");
    Ok(Json(ApiResponse::new(subscription)))
}

/// DELETE /api/v1/subscriptions/{id}
///
/// Pending reminders for the subscription abort on their next wake-up.
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = SubscriptionId::new(id);
    state
        .subscriptions
        .delete_subscription(&id)
        .await?
        .map(|_| {
            info!(subscription_id = %id, "Subscription deleted");
            StatusCode::NO_CONTENT
        })
        .ok_or_else(not_found)
}

/// Load a subscription or answer 404.
pub(crate) async fn find(state: &AppState, id: &SubscriptionId) -> Result<SubscriptionSnapshot> {
    state
        .subscriptions
        .find_subscription(id)
        .await?
        .ok_or_else(not_found)
}

fn not_found() -> AppError {
    AppError::NotFound("Subscription not found".to_string())
}
