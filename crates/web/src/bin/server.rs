//! SubTrack server binary.
//!
//! Reads `SUBTRACK_CONFIG` (a TOML file) when set, otherwise the
//! `SUBTRACK_*` environment variables.

use std::path::PathBuf;

use subtrack_web::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,subtrack_web=debug,subtrack_reminders=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var_os("SUBTRACK_CONFIG") {
        Some(path) => AppConfig::from_file(&PathBuf::from(path))?,
        None => AppConfig::from_env(),
    };

    tracing::info!(
        bind = %config.server.bind_address,
        trigger_mode = ?config.settings.trigger.mode,
        store = %config.settings.store.url,
        "Starting SubTrack server"
    );

    subtrack_web::server::run_server(config).await?;

    Ok(())
}
