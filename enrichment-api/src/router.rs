use std::future::ready;

use axum::{
    routing::{get, post},
    Router,
};
use tenant_limiter::{enforce_tenant_limit, TenantLimiter};
use tower_http::trace::TraceLayer;
use user_pipeline::pipeline::Pipeline;

use crate::handlers;
use crate::prometheus::{setup_metrics_recorder, track_metrics};

#[derive(Clone)]
pub struct State {
    pub pipeline: Pipeline,
    pub default_concurrency: usize,
    pub max_concurrency: usize,
}

impl State {
    /// Worker count for a batch: the requested one if any, never above the maximum.
    pub fn concurrency_for(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_concurrency)
            .clamp(1, self.max_concurrency.max(1))
    }
}

pub fn router(state: State, limiter: TenantLimiter, metrics: bool) -> Router {
    let process = post(handlers::process_users).layer(axum::middleware::from_fn_with_state(
        limiter,
        enforce_tenant_limit,
    ));

    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/_liveness", get(handlers::liveness))
        .route("/users/process", process)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::error!("failed to install metrics recorder: {}", e);
            router
        }
    }
}
