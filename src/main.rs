//! Application entry point for the `fleet-reports` service.
//!
//! This binary orchestrates the startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the SQLite pool and creating the schema if it does not exist
//! - Wiring the platform client, renderer, mailer and report pipeline
//! - Starting the report scheduler and the retention purge task
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Serving until Ctrl-C, then stopping the background tasks
//!
//! # Environment Variables
//! See [`fleet_reports::config::load_from_env`] for the full list; the
//! logging knobs are read here:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `FORCE_COLOR` (optional) – force ANSI colours on or off
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use dotenvy::dotenv;
use tokio::sync::watch;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{Context, Result};

use fleet_reports::config;
use fleet_reports::email::{ReportMailer, SmtpMailer};
use fleet_reports::platform::{PlatformClient, PlatformSettings};
use fleet_reports::render::DocumentRenderer;
use fleet_reports::report::ReportService;
use fleet_reports::routes::{self, AppState};
use fleet_reports::scheduler::{Scheduler, SqliteJobStore};
use fleet_reports::schema;
use fleet_reports::store::{self, ReportStore};

// ---

const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tokio::fs::create_dir_all(&cfg.storage_path)
        .await
        .with_context(|| format!("Failed to create storage directory '{}'", cfg.storage_path))?;

    tracing::info!("Attempting to open database: {}", cfg.db_url);

    let pool = store::connect(&cfg.db_url, cfg.db_pool_max)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open database '{}': {}", cfg.db_url, e))?;

    tracing::info!("Successfully opened database");

    schema::create_schema(&pool).await?;

    let platform = Arc::new(PlatformClient::new(PlatformSettings::from(&cfg))?);
    let mailer: Option<Arc<dyn ReportMailer>> = match SmtpMailer::from_config(&cfg)? {
        Some(mailer) => Some(Arc::new(mailer)),
        None => None,
    };
    let reports = Arc::new(ReportService::new(
        platform,
        ReportStore::new(pool.clone()),
        Arc::new(DocumentRenderer::new()?),
        mailer,
        &cfg.storage_path,
        cfg.public_base_url.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(SqliteJobStore::new(pool.clone())),
        reports.clone(),
        Duration::from_secs(cfg.scheduler_poll_secs),
    ));
    scheduler.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let purge = tokio::spawn(run_retention(
        ReportStore::new(pool.clone()),
        cfg.retention_days,
        shutdown_rx,
    ));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(AppState {
        reports,
        scheduler: scheduler.clone(),
        storage_root: cfg.storage_path.clone().into(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.service_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);
    scheduler.shutdown(SHUTDOWN_TIMEOUT).await;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, purge).await.is_err() {
        tracing::warn!("Retention task did not stop within {:?}", SHUTDOWN_TIMEOUT);
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Purge expired reports at startup and then once a day.
async fn run_retention(store: ReportStore, retention_days: u32, mut shutdown_rx: watch::Receiver<bool>) {
    // ---
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = store.purge_older_than(retention_days).await {
                    tracing::error!(error = %e, retention_days, "Retention purge failed");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!("Retention task stopping");
                    break;
                }
            }
        }
    }
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level from `RUST_LOG`, else `AXUM_LOG_LEVEL`
///
/// Called once at startup before any logging macros run.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,lettre=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
