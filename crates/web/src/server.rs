//! Server setup: storage, reminder runtime and the HTTP listener

use std::sync::Arc;

use subtrack_core::SystemClock;
use subtrack_reminders::{LoggingNotifier, ReminderRuntime, ReminderStore};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{AppConfig, AppState, Error, create_router};

/// Open the database and wire the reminder runtime.
///
/// Subscriptions, runs and timers share one store. Pending timers are
/// reloaded from it before this returns.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the runtime
/// cannot be built.
pub async fn build_state(config: &AppConfig) -> Result<(AppState, ReminderRuntime), Error> {
    let store = Arc::new(ReminderStore::open(config.settings.store.clone()).await?);

    let runtime = ReminderRuntime::build(
        &config.settings,
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(LoggingNotifier),
        Arc::new(SystemClock),
    )
    .await?;

    let recovered = runtime.scheduler.recover().await?;
    info!(recovered, "Durable timers recovered");

    Ok((AppState::new(store, runtime.service.clone()), runtime))
}

/// Run the axum server with the timer executor alongside.
///
/// # Errors
///
/// Returns an error if startup fails or the listener stops with an error.
pub async fn run_server(config: AppConfig) -> Result<(), Error> {
    let (state, runtime) = build_state(&config).await?;
    let app = create_router(&config.server, state)?;

    let executor = Arc::clone(&runtime.executor);
    let executor_task = tokio::spawn(async move { executor.start().await });

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    info!("SubTrack server listening on {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.executor.stop().await;
    if let Err(e) = executor_task.await {
        warn!(error = %e, "Timer executor task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
