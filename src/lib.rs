//! gerrit-watcher -- continuous-integration watcher for Gerrit patch sets.
//!
//! This crate listens to a review server's event stream, runs a sandboxed
//! build-and-test container for every eligible patch set, records each run
//! in a persistent ledger and reports outcomes back as review comments.
//! Scheduled health checks exercise the current branches on a cron cadence.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod launcher;
pub mod ledger;
pub mod reporter;
pub mod scheduler;
pub mod version;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::WatcherConfig;
use crate::dispatch::{Dispatcher, SshEventSource};
use crate::launcher::{DockerSandbox, Launcher};
use crate::ledger::Ledger;
use crate::reporter::{LogOnlyReviewClient, OutcomeReporter, ReviewClient, SshReviewClient};
use crate::scheduler::Scheduler;

/// Start the watcher: ledger, event dispatcher, health checks and HTTP server.
///
/// Returns once the HTTP server has shut down on ctrl-c / SIGTERM and the
/// ledger has been flushed to disk.
pub async fn serve(config: WatcherConfig) -> Result<()> {
    // 1. Ledger
    tracing::info!(path = %config.storage.ledger_path.display(), "loading run ledger");
    let ledger = Ledger::load(&config.storage.ledger_path)
        .await
        .with_context(|| {
            format!(
                "failed to load run ledger {}",
                config.storage.ledger_path.display()
            )
        })?;

    // 2. Launcher
    let logs_dir = config.storage.logs_dir.clone();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;
    let sandbox = Arc::new(DockerSandbox::new(config.sandbox.clone()));
    let launcher = Launcher::new(ledger.clone(), sandbox, logs_dir.clone());

    // 3. Reporter
    let client: Arc<dyn ReviewClient> = if config.gerrit.comments_enabled {
        Arc::new(SshReviewClient::new(config.gerrit.clone()))
    } else {
        tracing::warn!("review comments disabled, outcomes are only logged");
        Arc::new(LogOnlyReviewClient)
    };
    let reporter = OutcomeReporter::new(client, config.report.clone());

    // 4. Health checks (background task)
    let scheduler = Scheduler::from_config(launcher.clone(), &config)
        .context("invalid health check configuration")?;
    if let Some(revision) = &config.scheduler.startup_check {
        let _ = scheduler.fire(revision);
    }
    tokio::spawn(scheduler.run());

    // 5. Event dispatcher (background task)
    let dispatcher = Dispatcher::new(
        config.gerrit.project.clone(),
        config.sandbox.run_name_prefix.clone(),
        launcher,
        reporter,
    )
    .with_reconnect_delay(Duration::from_secs(config.gerrit.reconnect_delay_secs));
    let source = SshEventSource::new(config.gerrit.clone());
    tokio::spawn(async move { dispatcher.run(&source).await });

    // 6. HTTP server
    let addr: std::net::SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.http.bind))?;
    let state = api::state::AppState::new(ledger.clone(), logs_dir, &config.gerrit.project);
    let app = api::router(state);

    tracing::info!(%addr, project = %config.gerrit.project, "gerrit-watcher listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Runs still in flight stay `running` on disk and are aborted on next load.
    tracing::info!("shutting down, flushing run ledger");
    ledger.flush().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
