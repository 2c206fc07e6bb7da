//! Configuration for the reminder subsystem.

use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use subtrack_core::ResultExt;
use url::Url;

use crate::error::{Error, Result};
use crate::persistence::StoreConfig;
use crate::plan::DEFAULT_OFFSETS;

/// Top-level settings of the reminder subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub timers: TimerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Settings {
    /// Load settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, starting from defaults.
    ///
    /// Recognised keys: `SUBTRACK_REMINDER_OFFSETS` (comma separated days),
    /// `SUBTRACK_REMINDER_FIRE_TIME` (`HH:MM`), `SUBTRACK_TRIGGER_MODE`
    /// (`disabled`, `local`, `http`), `SUBTRACK_TRIGGER_TOKEN`,
    /// `SUBTRACK_TRIGGER_URL`, `SUBTRACK_PUBLIC_URL`, `SUBTRACK_DB_URL`.
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup("SUBTRACK_REMINDER_OFFSETS") {
            settings.reminders.offsets = parse_offsets(&raw)
                .or_default_logged("Invalid SUBTRACK_REMINDER_OFFSETS", DEFAULT_OFFSETS.to_vec());
        }

        if let Some(raw) = lookup("SUBTRACK_REMINDER_FIRE_TIME") {
            settings.reminders.fire_time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .or_default_logged("Invalid SUBTRACK_REMINDER_FIRE_TIME", NaiveTime::MIN);
        }

        if let Some(token) = lookup("SUBTRACK_TRIGGER_TOKEN").filter(|t| !t.trim().is_empty()) {
            settings.trigger.token = Some(token);
        }

        if let Some(raw) = lookup("SUBTRACK_TRIGGER_URL") {
            settings.trigger.endpoint = parse_url(&raw)
                .or_default_logged("Invalid SUBTRACK_TRIGGER_URL", default_endpoint());
        }

        if let Some(raw) = lookup("SUBTRACK_PUBLIC_URL") {
            settings.trigger.public_url = parse_url(&raw)
                .or_default_logged("Invalid SUBTRACK_PUBLIC_URL", default_public_url());
        }

        settings.trigger.mode = match lookup("SUBTRACK_TRIGGER_MODE") {
            Some(raw) => raw
                .parse()
                .or_default_logged("Invalid SUBTRACK_TRIGGER_MODE", TriggerMode::Local),
            // A token without an explicit mode means an external substrate.
            None if settings.trigger.token.is_some() => TriggerMode::Http,
            None => settings.trigger.mode,
        };

        if let Some(url) = lookup("SUBTRACK_DB_URL") {
            settings.store.url = url;
        }

        settings
    }

    /// Load settings from a JSON or TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {e}", path.display())))?;

        let settings: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when HTTP triggering is selected without
    /// a token, or when a trigger URL does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.trigger.mode == TriggerMode::Http && self.trigger.token.is_none() {
            return Err(Error::config("trigger mode 'http' requires a token"));
        }
        parse_url(&self.trigger.endpoint)?;
        parse_url(&self.trigger.public_url)?;
        Ok(())
    }
}

/// Reminder schedule settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Days before renewal at which reminders fire.
    #[serde(default = "default_offsets")]
    pub offsets: Vec<u32>,
    /// Time of day (UTC) at which a reminder day starts firing.
    #[serde(default = "default_fire_time")]
    pub fire_time: NaiveTime,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            offsets: default_offsets(),
            fire_time: default_fire_time(),
        }
    }
}

/// How reminder runs are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Never schedule runs.
    Disabled,
    /// In-process durable timers.
    #[default]
    Local,
    /// External workflow substrate over HTTP.
    Http,
}

impl std::str::FromStr for TriggerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "local" => Ok(Self::Local),
            "http" => Ok(Self::Http),
            other => Err(Error::config(format!("unknown trigger mode '{other}'"))),
        }
    }
}

/// Trigger substrate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub mode: TriggerMode,
    /// Bearer token for the external substrate.
    #[serde(default)]
    pub token: Option<String>,
    /// Base URL of the external substrate.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Public base URL of this service, which the substrate calls back.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            token: None,
            endpoint: default_endpoint(),
            public_url: default_public_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Durable timer executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Tick interval for polling timers.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Maximum concurrent callbacks.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum retries per timer.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Default retry delay in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn parse_offsets(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| Error::config(format!("offset '{s}': {e}")))
        })
        .collect()
}

fn default_offsets() -> Vec<u32> {
    DEFAULT_OFFSETS.to_vec()
}

const fn default_fire_time() -> NaiveTime {
    NaiveTime::MIN
}

/// Parse and normalise a base URL, dropping any trailing slash.
///
/// # Errors
///
/// Returns a configuration error if `raw` is not an absolute URL.
pub fn parse_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::config(format!("invalid URL '{}': {e}", raw.trim())))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn default_endpoint() -> String {
    "https://qstash.upstash.io".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_max_concurrent() -> usize {
    16
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay_secs() -> u64 {
    60
}
