use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use user_pipeline::pipeline::PipelineStats;
use user_pipeline::record::UserRecord;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub users: Vec<UserRecord>,
    /// Worker count for this batch, clamped to the configured maximum.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub users: Vec<UserRecord>,
    pub stats: PipelineStats,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RequestParsingError(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            ),
        }
        .into_response()
    }
}
