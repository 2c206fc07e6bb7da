//! Entry points that start reminder runs.
//!
//! A gateway turns "a subscription was created" into a scheduled call of
//! the run entry point. When nothing is configured, scheduling yields no
//! handle and callers carry on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtrack_core::SubscriptionId;
use tracing::{debug, info};

use crate::config::{parse_url, TriggerConfig, TriggerMode};
use crate::error::{Error, Result};
use crate::timers::{DurableTimer, ResumePayload, TimerId, TimerScheduler, RESUME_RUN_CALLBACK};

/// Handle of a scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub workflow_run_id: String,
}

/// Schedules reminder runs on a durable substrate.
#[async_trait]
pub trait TriggerGateway: Send + Sync {
    /// Ask the substrate to invoke the run entry point for `subscription_id`.
    ///
    /// Returns `None` when the substrate is not configured.
    async fn schedule_run(&self, subscription_id: &SubscriptionId) -> Result<Option<RunHandle>>;

    /// Whether runs can be scheduled at all.
    fn is_configured(&self) -> bool;
}

/// Gateway used when triggering is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTriggerGateway;

#[async_trait]
impl TriggerGateway for DisabledTriggerGateway {
    async fn schedule_run(&self, subscription_id: &SubscriptionId) -> Result<Option<RunHandle>> {
        debug!(subscription_id = %subscription_id, "Trigger not configured, skipping");
        Ok(None)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Gateway that starts runs through the in-process durable timers.
///
/// The run is scheduled as an immediately due timer, so it survives a
/// restart that happens before the executor picks it up.
pub struct TimerTriggerGateway {
    scheduler: Arc<TimerScheduler>,
}

impl TimerTriggerGateway {
    #[must_use]
    pub const fn new(scheduler: Arc<TimerScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl TriggerGateway for TimerTriggerGateway {
    async fn schedule_run(&self, subscription_id: &SubscriptionId) -> Result<Option<RunHandle>> {
        let now = self.scheduler.clock().now();
        let payload = serde_json::to_value(ResumePayload {
            subscription_id: subscription_id.clone(),
            label: None,
        })?;
        let timer = DurableTimer::new(TimerId::for_trigger(), now, payload, now)
            .with_callback(RESUME_RUN_CALLBACK);

        let timer_id = self.scheduler.schedule(timer).await?;
        info!(subscription_id = %subscription_id, timer_id = %timer_id, "Reminder run scheduled");
        Ok(Some(RunHandle {
            workflow_run_id: timer_id.as_str().to_string(),
        }))
    }

    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerBody<'a> {
    subscription_id: &'a SubscriptionId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    workflow_run_id: String,
}

/// Gateway that asks an external workflow service to call this service back.
///
/// The service receives `POST {endpoint}/v2/trigger/{callback}` where
/// `callback` is this service's run endpoint, and answers with the id of
/// the workflow run it created. Retries are left to the engine, so the
/// request disables the service's own delivery retries.
#[derive(Debug, Clone)]
pub struct HttpTriggerGateway {
    http_client: reqwest::Client,
    endpoint: String,
    public_url: String,
    token: Option<String>,
}

impl HttpTriggerGateway {
    /// Create a gateway from trigger settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a URL does not parse or the HTTP
    /// client cannot be built.
    pub fn new(config: &TriggerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            endpoint: parse_url(&config.endpoint)?,
            public_url: parse_url(&config.public_url)?,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    /// The URL the workflow service calls to advance a run.
    #[must_use]
    pub fn callback_url(&self, subscription_id: &SubscriptionId) -> String {
        format!(
            "{}/api/v1/subscriptions/{subscription_id}/reminder-jobs/run",
            self.public_url
        )
    }
}

#[async_trait]
impl TriggerGateway for HttpTriggerGateway {
    async fn schedule_run(&self, subscription_id: &SubscriptionId) -> Result<Option<RunHandle>> {
        let Some(token) = self.token.as_deref() else {
            debug!(subscription_id = %subscription_id, "No trigger token, skipping");
            return Ok(None);
        };

        let url = format!(
            "{}/v2/trigger/{}",
            self.endpoint,
            self.callback_url(subscription_id)
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .header("Upstash-Retries", "0")
            .json(&TriggerBody { subscription_id })
            .send()
            .await
            .map_err(|e| Error::trigger_failed(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::trigger_failed(format!("HTTP {status}: {body}")));
        }

        let parsed: TriggerResponse = response
            .json()
            .await
            .map_err(|e| Error::trigger_failed(format!("Invalid trigger response: {e}")))?;

        info!(
            subscription_id = %subscription_id,
            workflow_run_id = %parsed.workflow_run_id,
            "Reminder run triggered"
        );
        Ok(Some(RunHandle {
            workflow_run_id: parsed.workflow_run_id,
        }))
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

/// Build the gateway selected by `config`.
///
/// # Errors
///
/// Returns a configuration error if the HTTP gateway cannot be built.
pub fn from_config(
    config: &TriggerConfig,
    scheduler: Arc<TimerScheduler>,
) -> Result<Arc<dyn TriggerGateway>> {
    Ok(match config.mode {
        TriggerMode::Disabled => Arc::new(DisabledTriggerGateway),
        TriggerMode::Local => Arc::new(TimerTriggerGateway::new(scheduler)),
        TriggerMode::Http => Arc::new(HttpTriggerGateway::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use subtrack_core::ManualClock;
    use wiremock::matchers::{body_json, header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn http_config(endpoint: &str, token: Option<&str>) -> TriggerConfig {
        TriggerConfig {
            mode: TriggerMode::Http,
            token: token.map(str::to_string),
            endpoint: endpoint.to_string(),
            public_url: "https://api.example.com".to_string(),
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_disabled_gateway_returns_no_handle() -> Result<()> {
        let gateway = DisabledTriggerGateway;
        assert!(!gateway.is_configured());
        assert_eq!(gateway.schedule_run(&SubscriptionId::new("s1")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_timer_gateway_schedules_due_timer() -> Result<()> {
        let start: DateTime<Utc> = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let scheduler = Arc::new(TimerScheduler::in_memory(Arc::new(ManualClock::new(start))));
        let gateway = TimerTriggerGateway::new(Arc::clone(&scheduler));

        let handle = gateway.schedule_run(&SubscriptionId::new("s1")).await?;
        assert!(handle.is_some_and(|h| h.workflow_run_id.starts_with("run_")));

        let due = scheduler.poll_due().await;
        assert_eq!(due.len(), 1);
        let payload = due
            .first()
            .map(|t| serde_json::from_value::<ResumePayload>(t.payload().clone()));
        assert!(matches!(payload, Some(Ok(p)) if p.subscription_id.as_str() == "s1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_gateway_without_token_returns_no_handle() -> Result<()> {
        let gateway = HttpTriggerGateway::new(&http_config("http://127.0.0.1:9", None))?;
        assert!(!gateway.is_configured());
        assert_eq!(gateway.schedule_run(&SubscriptionId::new("s1")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_http_gateway_posts_trigger() -> TestResult {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(
                r"^/v2/trigger/.+/api/v1/subscriptions/s1/reminder-jobs/run$",
            ))
            .and(header("authorization", "Bearer secret"))
            .and(header("upstash-retries", "0"))
            .and(body_json(serde_json::json!({"subscriptionId": "s1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"workflowRunId": "wfr_123"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gateway = HttpTriggerGateway::new(&http_config(&mock_server.uri(), Some("secret")))?;
        let handle = gateway.schedule_run(&SubscriptionId::new("s1")).await?;

        assert_eq!(
            handle,
            Some(RunHandle {
                workflow_run_id: "wfr_123".to_string()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_http_gateway_error_status_is_retryable() -> TestResult {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let gateway = HttpTriggerGateway::new(&http_config(&mock_server.uri(), Some("secret")))?;
        let result = gateway.schedule_run(&SubscriptionId::new("s1")).await;

        assert!(matches!(&result, Err(e) if e.is_retryable()));
        Ok(())
    }

    #[test]
    fn test_callback_url() -> Result<()> {
        let gateway = HttpTriggerGateway::new(&http_config("https://qstash.upstash.io", None))?;
        assert_eq!(
            gateway.callback_url(&SubscriptionId::new("abc")),
            "https://api.example.com/api/v1/subscriptions/abc/reminder-jobs/run"
        );
        Ok(())
    }
}
