//! Server configuration: bind address, CORS and the reminder settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use subtrack_reminders::Settings;

use crate::Error;

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Allowed CORS origin; `*` allows any origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(flatten)]
    pub settings: Settings,
}

impl AppConfig {
    /// Load from `SUBTRACK_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let server = ServerConfig {
            bind_address: lookup("SUBTRACK_BIND").unwrap_or(defaults.bind_address),
            cors_origin: lookup("SUBTRACK_CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        };
        Self {
            server,
            settings: Settings::from_lookup(lookup),
        }
    }

    /// Load a TOML file: a `[server]` table next to the reminder settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the
    /// reminder settings are invalid.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
        config.settings.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use subtrack_reminders::TriggerMode;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert_eq!(config.cors_origin, "*");
    }

    #[test]
    fn test_from_lookup_reads_server_and_reminder_keys() {
        let vars: HashMap<&str, &str> = [
            ("SUBTRACK_BIND", "0.0.0.0:8080"),
            ("SUBTRACK_CORS_ORIGIN", "https://app.example.com"),
            ("SUBTRACK_TRIGGER_MODE", "disabled"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.server.cors_origin, "https://app.example.com");
        assert_eq!(config.settings.trigger.mode, TriggerMode::Disabled);
    }

    #[test]
    fn test_toml_layout() -> Result<(), toml::de::Error> {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            bind_address = "0.0.0.0:9000"

            [reminders]
            offsets = [3, 1]
            "#,
        )?;
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.server.cors_origin, "*");
        assert_eq!(config.settings.reminders.offsets, vec![3, 1]);
        Ok(())
    }
}
