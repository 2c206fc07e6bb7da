//! SubTrack Web Server
//!
//! HTTP API for subscriptions and the reminder workflow, with tower
//! middleware for CORS, tracing, and compression.

use axum::{
    Router,
    http::{HeaderValue, Method},
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{AppConfig, ServerConfig};
pub use error::AppError;
pub use state::AppState;

/// Create the application router with middleware.
///
/// # Errors
///
/// Returns an error if the CORS origin is not a valid header value.
pub fn create_router(config: &ServerConfig, state: AppState) -> Result<Router, Error> {
    info!("Creating router with CORS origin: {}", config.cors_origin);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    let cors = if config.cors_origin == "*" {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(config.cors_origin.parse::<HeaderValue>()?)
    };

    let router = routes::create_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    );

    Ok(router)
}

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    /// Socket or file error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reminder subsystem failed to start
    #[error("Reminder subsystem error: {0}")]
    Reminders(#[from] subtrack_reminders::Error),

    /// Database could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] subtrack_reminders::persistence::PersistenceError),
}
