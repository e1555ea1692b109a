use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::services::{BatchJobStore, ExpenseGateway};
use shared::jwt::JwtConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::jobs::BatchDispatcher;
use crate::middleware::{metrics_handler, metrics_middleware, require_user_auth, trace_id};
use crate::routes::{batch_jobs, expense_batches, health};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub expenses: Arc<dyn ExpenseGateway>,
    pub jobs: Arc<dyn BatchJobStore>,
    pub dispatcher: BatchDispatcher,
}

impl AppState {
    /// Wires the dispatcher to the given stores using the batch settings
    /// from `config`.
    pub fn new(
        config: Config,
        jwt: JwtConfig,
        expenses: Arc<dyn ExpenseGateway>,
        jobs: Arc<dyn BatchJobStore>,
    ) -> Self {
        let dispatcher =
            BatchDispatcher::from_config(Arc::clone(&expenses), Arc::clone(&jobs), &config.batch);

        Self {
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            expenses,
            jobs,
            dispatcher,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // The CSV upload gets its own, larger body limit.
    let upload_routes = Router::new()
        .route(
            "/api/v1/expenses/batch-upload",
            post(expense_batches::batch_upload_csv),
        )
        .layer(DefaultBodyLimit::max(config.batch.max_upload_bytes));

    let json_routes = Router::new()
        .route("/api/v1/expenses/batch", put(expense_batches::batch_update))
        .route(
            "/api/v1/expenses/batch-async",
            put(expense_batches::batch_update_async),
        )
        .route(
            "/api/v1/expenses/batch-async/:job_id",
            get(batch_jobs::get_batch_job),
        )
        .route("/api/v1/batch/jobs/:job_id", get(batch_jobs::get_batch_job))
        .layer(DefaultBodyLimit::max(config.server.max_body_size));

    let protected_routes = Router::new()
        .merge(upload_routes)
        .merge(json_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config.security.cors_origins))
        .with_state(state)
}
