//! REST API integration tests

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use subtrack_core::ManualClock;
use subtrack_reminders::{
    InMemoryRunStorage, InMemorySubscriptionStore, InMemoryTimerStore, LoggingNotifier,
    ReminderRuntime, Settings, TriggerMode,
};
use subtrack_web::{AppState, ServerConfig, create_router};
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct TestApp {
    router: Router,
    runtime: ReminderRuntime,
    clock: ManualClock,
}

async fn test_app(mode: TriggerMode) -> Result<TestApp, Box<dyn std::error::Error>> {
    let clock = ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default(),
    );
    let mut settings = Settings::default();
    settings.trigger.mode = mode;

    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let runtime = ReminderRuntime::build(
        &settings,
        subscriptions.clone(),
        Arc::new(InMemoryRunStorage::new()),
        Arc::new(InMemoryTimerStore::new()),
        Arc::new(LoggingNotifier),
        Arc::new(clock.clone()),
    )
    .await?;

    let state = AppState::new(subscriptions, runtime.service.clone());
    let router = create_router(&ServerConfig::default(), state)?;
    Ok(TestApp {
        router,
        runtime,
        clock,
    })
}

fn netflix() -> Value {
    json!({
        "name": "Netflix Premium",
        "price": 15.99,
        "currency": "USD",
        "frequency": "monthly",
        "category": "entertainment",
        "paymentMethod": "Credit Card",
        "startDate": "2026-01-01",
        "user": {"id": "u1", "name": "Ada", "email": "ada@example.com"}
    })
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Option<String>, Value), Box<dyn std::error::Error>> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, location, json))
}

async fn create_netflix(app: &TestApp) -> Result<String, Box<dyn std::error::Error>> {
    let (_, _, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/subscriptions",
        Some(netflix()),
    )
    .await?;
    Ok(body["data"]["subscription"]["id"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn given_valid_subscription_when_created_then_returns_201_with_location_and_run_id()
-> TestResult {
    let app = test_app(TriggerMode::Local).await?;

    let (status, location, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/subscriptions",
        Some(netflix()),
    )
    .await?;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["data"]["subscription"]["id"].as_str().unwrap_or_default();
    assert!(!id.is_empty());
    assert_eq!(location, Some(format!("/api/v1/subscriptions/{id}")));
    assert_eq!(body["data"]["subscription"]["renewalDate"], "2026-01-31");
    assert_eq!(body["data"]["subscription"]["status"], "active");
    assert!(body["data"]["workflowRunId"].is_string());
    Ok(())
}

#[tokio::test]
async fn given_disabled_trigger_when_created_then_still_201_with_null_run_id() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/subscriptions",
        Some(netflix()),
    )
    .await?;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["workflowRunId"].is_null());
    Ok(())
}

#[tokio::test]
async fn given_invalid_fields_when_created_then_returns_validation_error() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;
    let mut input = netflix();
    input["name"] = json!("N");
    input["price"] = Value::Null;

    let (status, _, body) =
        send(&app.router, Method::POST, "/api/v1/subscriptions", Some(input)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        body["error"]["message"],
        "Subscription name must be between 2 and 100 characters, Subscription price is required"
    );
    Ok(())
}

#[tokio::test]
async fn given_malformed_body_when_created_then_returns_bad_request() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/subscriptions",
        Some(json!({"name": "No start date"})),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    Ok(())
}

#[tokio::test]
async fn given_unknown_id_when_fetched_then_returns_404() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;

    let (status, _, body) =
        send(&app.router, Method::GET, "/api/v1/subscriptions/nope", None).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Subscription not found");
    Ok(())
}

#[tokio::test]
async fn given_created_subscription_when_fetched_then_returns_it() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;
    let id = create_netflix(&app).await?;

    let (status, _, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/subscriptions/{id}"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Netflix Premium");
    assert_eq!(body["data"]["currency"], "USD");
    Ok(())
}

#[tokio::test]
async fn given_renewal_date_passed_when_fetched_then_status_reads_expired() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    app.clock.advance(Duration::days(32));
    let (status, _, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/subscriptions/{id}"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["renewalDate"], "2026-01-31");
    assert_eq!(body["data"]["status"], "expired");
    Ok(())
}

#[tokio::test]
async fn given_active_subscription_when_canceled_then_returns_canceled_status() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, body) = send(
        &app.router,
        Method::PUT,
        &format!("/api/v1/subscriptions/{id}/cancel"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["status"], "canceled");
    Ok(())
}

#[tokio::test]
async fn given_unknown_id_when_canceled_then_returns_404() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;

    let (status, _, body) = send(
        &app.router,
        Method::PUT,
        "/api/v1/subscriptions/nope/cancel",
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    Ok(())
}

// ============================================================================
// Reminder jobs
// ============================================================================

#[tokio::test]
async fn given_unconfigured_trigger_when_job_requested_then_returns_503() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "WORKFLOW_NOT_CONFIGURED");
    Ok(())
}

#[tokio::test]
async fn given_unknown_subscription_when_job_requested_then_returns_404() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;

    let (status, _, _) = send(
        &app.router,
        Method::POST,
        "/api/v1/subscriptions/nope/reminder-jobs",
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn given_local_trigger_when_job_requested_then_returns_201_with_run_location() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;
    let id = create_netflix(&app).await?;

    let (status, location, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::CREATED);
    let run_id = body["data"]["workflowRunId"].as_str().unwrap_or_default();
    assert!(!run_id.is_empty());
    assert_eq!(
        location,
        Some(format!("/api/v1/subscriptions/{id}/reminder-jobs/{run_id}"))
    );
    Ok(())
}

#[tokio::test]
async fn given_scheduled_trigger_when_executor_ticks_then_run_is_listed() -> TestResult {
    let app = test_app(TriggerMode::Local).await?;
    let id = create_netflix(&app).await?;

    assert_eq!(app.runtime.executor.tick().await, 1);

    let (status, _, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    let runs = body["data"].as_array().map_or(0, Vec::len);
    assert_eq!(runs, 1);
    assert_eq!(body["data"][0]["state"], "sleeping");
    Ok(())
}

// ============================================================================
// Substrate entry points
// ============================================================================

#[tokio::test]
async fn given_active_subscription_when_run_called_then_suspends_until_first_checkpoint()
-> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs/run"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["status"], "suspended");
    assert_eq!(body["data"]["outcome"]["wake_at"], "2026-01-24T00:00:00Z");
    assert_eq!(body["data"]["renewalDate"], "2026-01-31");
    Ok(())
}

#[tokio::test]
async fn given_payload_id_when_workflow_called_then_runs_that_subscription() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/workflows/subscription/reminder",
        Some(json!({"subscriptionId": id})),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscriptionId"], id.as_str());
    assert_eq!(body["data"]["outcome"]["status"], "suspended");
    Ok(())
}

#[tokio::test]
async fn given_missing_payload_id_when_workflow_called_then_returns_400() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/workflows/subscription/reminder",
        Some(json!({})),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Missing subscription id");
    Ok(())
}

#[tokio::test]
async fn given_deleted_subscription_when_run_called_then_aborts_as_missing() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, _) = send(
        &app.router,
        Method::DELETE,
        &format!("/api/v1/subscriptions/{id}"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs/run"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["status"], "aborted");
    assert_eq!(body["data"]["outcome"]["reason"], "subscription_missing");
    Ok(())
}

#[tokio::test]
async fn given_canceled_subscription_when_run_called_then_aborts_as_not_active() -> TestResult {
    let app = test_app(TriggerMode::Disabled).await?;
    let id = create_netflix(&app).await?;

    let (status, _, _) = send(
        &app.router,
        Method::PUT,
        &format!("/api/v1/subscriptions/{id}/cancel"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/subscriptions/{id}/reminder-jobs/run"),
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"]["status"], "aborted");
    assert_eq!(body["data"]["outcome"]["reason"], "not_active");
    Ok(())
}
