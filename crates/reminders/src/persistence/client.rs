//! SurrealDB connection for reminder persistence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::info;

use super::error::{PersistenceResult, from_surrealdb_error};

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL ("mem://", "rocksdb://path", "ws://host:port").
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Root credentials for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl StoreConfig {
    /// In-memory configuration, lost on exit.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: default_url(),
            namespace: default_namespace(),
            database: default_database(),
            credentials: None,
        }
    }

    /// Embedded RocksDB configuration at `path`.
    #[must_use]
    pub fn rocksdb(path: &str) -> Self {
        Self {
            url: format!("rocksdb://{path}"),
            ..Self::in_memory()
        }
    }

    /// Set credentials for authentication.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn default_url() -> String {
    "mem://".to_string()
}

fn default_namespace() -> String {
    "subtrack".to_string()
}

fn default_database() -> String {
    "reminders".to_string()
}

/// Connection to the reminder database.
///
/// Implements both [`crate::storage::RunStorage`] and
/// [`crate::timers::TimerStore`].
#[derive(Debug, Clone)]
pub struct ReminderStore {
    db: Arc<Surreal<Any>>,
    config: StoreConfig,
}

impl ReminderStore {
    /// Connect to the database with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or authentication fails.
    pub async fn connect(config: StoreConfig) -> PersistenceResult<Self> {
        let db = Surreal::<Any>::init();

        db.connect(&config.url)
            .await
            .map_err(from_surrealdb_error)?;

        if let Some(creds) = &config.credentials {
            db.signin(Root {
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(from_surrealdb_error)?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(from_surrealdb_error)?;

        info!(url = %config.url, "Connected to reminder store");
        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    /// Connect and initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or schema initialization fails.
    pub async fn open(config: StoreConfig) -> PersistenceResult<Self> {
        let store = Self::connect(config).await?;
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Get a reference to the underlying database client.
    #[must_use]
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Initialize the database schema.
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails.
    pub async fn initialize_schema(&self) -> PersistenceResult<()> {
        self.db
            .query(include_str!("schema.surql"))
            .await
            .map_err(from_surrealdb_error)?
            .check()
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    /// Check if the database is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub async fn health_check(&self) -> PersistenceResult<()> {
        self.db
            .query("INFO FOR DB")
            .await
            .map_err(from_surrealdb_error)?;
        Ok(())
    }
}
