use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use metrics::counter;
use tracing::instrument;

use crate::api::{ApiError, ProcessRequest, ProcessResponse};
use crate::router;

pub async fn index() -> &'static str {
    "enrichment-api"
}

pub async fn liveness() -> &'static str {
    "ok"
}

#[instrument(skip_all, fields(users, concurrency))]
pub async fn process_users(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, ApiError> {
    let request: ProcessRequest = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!("rejected invalid payload: {}", err);
        err
    })?;

    let concurrency = state.concurrency_for(request.concurrency);
    tracing::Span::current().record("users", request.users.len());
    tracing::Span::current().record("concurrency", concurrency);

    counter!("api_users_received_total").increment(request.users.len() as u64);

    let report = state
        .pipeline
        .process_with_report(request.users, concurrency)
        .await;

    counter!("api_users_returned_total").increment(report.records.len() as u64);

    Ok(Json(ProcessResponse {
        users: report.records,
        stats: report.stats,
    }))
}
