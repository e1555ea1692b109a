use std::sync::Arc;

use anyhow::{Context, Result};
use domain::services::BatchJobStore;
use expense_tracker_api::{
    app::{create_app, AppState},
    config::Config,
    jobs::{close_interrupted_jobs, JobScheduler, RuntimeGaugesJob},
    middleware::{init_metrics, logging::init_logging, UserAuth},
};
use persistence::repositories::{PgBatchJobRepository, PgExpenseRepository};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;
    init_metrics().context("Failed to install metrics recorder")?;

    info!(
        "Starting Expense Tracker batch service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = persistence::db::create_pool(&config.database.to_pool_config())
        .await
        .context("Failed to connect to database")?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let jwt = UserAuth::create_jwt_config(&config.jwt).context("Invalid JWT configuration")?;
    let expenses = PgExpenseRepository::new(pool.clone());
    let batch_jobs: Arc<dyn BatchJobStore> = Arc::new(PgBatchJobRepository::new(pool.clone()));

    let addr = config.socket_addr().context("Invalid server address")?;
    let shutdown_timeout = config.batch.shutdown_timeout();

    // Before the dispatcher exists, so only jobs of a previous run match.
    close_interrupted_jobs(&batch_jobs, config.batch.stale_job_after_secs)
        .await
        .context("Failed to close interrupted batch jobs")?;

    let state = AppState::new(config, jwt, Arc::new(expenses), batch_jobs);
    let mut scheduler = JobScheduler::new();
    let dispatcher = state.dispatcher.clone();
    scheduler.register(RuntimeGaugesJob::new(pool.clone(), dispatcher.clone()));
    scheduler.start();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining batch jobs");
    if !dispatcher.shutdown(shutdown_timeout).await {
        warn!("Some batch jobs were still running at exit");
    }

    scheduler.shutdown(Duration::from_secs(5)).await;
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
