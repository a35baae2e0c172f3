use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{JobStore, MetadataApi};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::Config;
use crate::jobs::{
    ExpiredJobCleanupJob, JobScheduler, StaleJobSweepJob, TaskQueue, TaskRunner, WorkerPool,
};
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{deploy_jobs, health, jobs};
use crate::services::{DeployService, JobService, MetadataFetchService, RetryPolicy};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn JobStore>,
    pub jobs: Arc<JobService>,
}

/// Workers and periodic jobs running next to the HTTP server.
pub struct Background {
    workers: WorkerPool,
    scheduler: JobScheduler,
}

impl Background {
    /// Stops taking new work and waits up to `grace` for in-flight tasks.
    pub async fn shutdown(self, grace: Duration) {
        self.workers.shutdown();
        self.scheduler.shutdown();
        tokio::join!(
            self.workers.wait_for_shutdown(grace),
            self.scheduler.wait_for_shutdown(grace)
        );
    }
}

/// Wires the store and the remote API into the router, the worker pool and
/// the maintenance scheduler. Must be called inside a tokio runtime.
pub fn build(
    config: Config,
    store: Arc<dyn JobStore>,
    api: Arc<dyn MetadataApi>,
) -> (Router, Background) {
    let retry = RetryPolicy::from_config(&config.worker);
    let (queue, receiver) = TaskQueue::new(config.worker.queue_capacity);

    let runner = TaskRunner::new(
        MetadataFetchService::new(store.clone(), api.clone(), retry),
        DeployService::new(store.clone(), api, retry),
    );
    let workers = WorkerPool::start(config.worker.concurrency, receiver, Arc::new(runner));

    let mut scheduler = JobScheduler::new();
    scheduler.register(StaleJobSweepJob::new(
        store.clone(),
        queue.in_flight(),
        config.worker.stale_job_minutes,
        config.worker.sweep_interval_secs,
    ));
    let cleanup = ExpiredJobCleanupJob::new(store.clone(), config.worker.retention_days);
    if cleanup.is_enabled() {
        scheduler.register(cleanup);
    } else {
        info!("Job retention cleanup disabled");
    }
    scheduler.start();

    let state = AppState {
        jobs: Arc::new(JobService::new(store.clone(), queue)),
        store,
        config: Arc::new(config),
    };

    (create_app(state), Background { workers, scheduler })
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api_routes = Router::new()
        .route("/api/v1/jobs", post(jobs::create_job))
        .route("/api/v1/jobs/:job_id", get(jobs::get_job))
        .route("/api/v1/jobs/:job_id/status", get(jobs::get_job_status))
        .route(
            "/api/v1/jobs/:job_id/deploy/:metadata_type",
            post(jobs::create_deploy_job),
        )
        .route(
            "/api/v1/deploy-jobs/:deploy_job_id",
            get(deploy_jobs::get_deploy_job),
        )
        .route(
            "/api/v1/deploy-jobs/:deploy_job_id/status",
            get(deploy_jobs::get_deploy_job_status),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
