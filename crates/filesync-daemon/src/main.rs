//! filesync daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Opening the durable queue and local block store
//! - Draining upload/delete tasks to the remote block service
//! - Periodic status logging
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon wires the SQLite stores and the HTTP remote into a
//! [`FileSync`] engine, starts its worker pool and then waits. Shutdown is
//! driven by a `CancellationToken` that is cancelled on SIGTERM or SIGINT;
//! in-flight tasks are released back to the queue and resume at the next
//! start.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use filesync_cache::{DatabasePool, SqliteBlockStore, SqliteTaskRepository};
use filesync_core::config::Config;
use filesync_core::domain::SyncEvent;
use filesync_remote::HttpRemoteStore;
use filesync_sync::FileSync;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the daemon logs a queue summary
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "filesyncd", version, about = "filesync background synchronization daemon")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the engine and the database for the lifetime of the process
struct DaemonService {
    /// Database pool shared by the task repository and the block store
    db_pool: DatabasePool,
    /// The sync engine
    sync: FileSync,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the stores and restores the task queue
    async fn new(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open database")?;

        let tasks = Arc::new(SqliteTaskRepository::new(db_pool.pool().clone()));
        let blocks = Arc::new(SqliteBlockStore::new(db_pool.pool().clone()));
        let remote = Arc::new(
            HttpRemoteStore::new(&config.remote).context("Failed to create remote client")?,
        );
        info!(base_url = %remote.base_url(), "Remote block service configured");

        let sync = FileSync::open(config, tasks, blocks, remote)
            .await
            .context("Failed to restore task queue")?;

        Ok(Self {
            db_pool,
            sync,
            shutdown,
        })
    }

    /// Runs the engine until shutdown
    async fn run(&self) -> Result<()> {
        let mut events = self.sync.subscribe();
        self.sync.start(&self.shutdown);

        let status = self.sync.sync_status();
        info!(
            pending = status.queue_len,
            dead_lettered = status.dead_lettered.len(),
            "Sync engine running"
        );

        let mut interval = tokio::time::interval(STATUS_LOG_INTERVAL);
        // The first tick fires immediately; the startup summary above covers it
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    let status = self.sync.sync_status();
                    info!(
                        queue_len = status.queue_len,
                        in_flight = status.in_flight,
                        backed_off = status.backed_off,
                        dead_lettered = status.dead_lettered.len(),
                        "Sync status"
                    );
                }
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.sync.shutdown().await;
        self.db_pool.close().await;
        Ok(())
    }
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Completed { key } => info!(task = %key, "Synced"),
        SyncEvent::Retrying {
            key,
            attempt,
            delay_ms,
            error,
        } => info!(task = %key, attempt, delay_ms, error = %error, "Retry scheduled"),
        SyncEvent::DeadLettered { key, error } => {
            warn!(task = %key, error = %error, "Needs attention: task dead-lettered")
        }
        SyncEvent::Cancelled { key, replaced_by } => {
            info!(task = %key, replaced_by = %replaced_by, "Superseded")
        }
    }
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Loads and validates the configuration
///
/// An explicit path must exist; the default path falls back to defaults.
fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let (config, path) = match path {
        Some(path) => (Config::load(&path)?, path),
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!("Invalid configuration {}: {}", path.display(), joined);
    }
    Ok((config, path))
}

/// `RUST_LOG` wins over `logging.level`
fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_path) = load_config(args.config)?;
    init_tracing(&config);

    info!(
        config_path = %config_path.display(),
        database = %config.storage.database.display(),
        workers = config.sync.workers,
        "filesync daemon starting (filesyncd)"
    );

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(&config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("filesync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "filesync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
