use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::limiter::{LimitExceeded, TenantLimiter};

pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LimitRejection {
    #[error("Missing tenant ID")]
    MissingTenantId,
    #[error("Rate limit exceeded")]
    LimitExceeded(#[from] LimitExceeded),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LimitExceededBody {
    error: String,
    limit: u32,
    window_ms: i64,
}

impl IntoResponse for LimitRejection {
    fn into_response(self) -> Response {
        match self {
            LimitRejection::MissingTenantId => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            LimitRejection::LimitExceeded(exceeded) => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(LimitExceededBody {
                    error: self.to_string(),
                    limit: exceeded.limit,
                    window_ms: exceeded.window_ms(),
                }),
            )
                .into_response(),
        }
    }
}

/// Middleware gating every request on the caller's tenant budget.
///
/// Use with `axum::middleware::from_fn_with_state(limiter, enforce_tenant_limit)`.
pub async fn enforce_tenant_limit(
    State(limiter): State<TenantLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, LimitRejection> {
    let tenant = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|tenant| !tenant.is_empty())
        .ok_or_else(|| {
            metrics::counter!("tenant_limiter_rejections_total", "reason" => "missing_tenant")
                .increment(1);
            LimitRejection::MissingTenantId
        })?;

    if let Err(exceeded) = limiter.check(tenant) {
        warn!(tenant, "tenant over its request budget");
        metrics::counter!("tenant_limiter_rejections_total", "reason" => "limit_exceeded")
            .increment(1);
        return Err(exceeded.into());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use time::macros::datetime;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::ManualClock;

    fn app(limit: u32) -> Router {
        let limiter = TenantLimiter::with_clock(
            NonZeroU32::new(limit).unwrap(),
            std::time::Duration::from_secs(60),
            ManualClock::new(datetime!(2024-01-01 0:00 UTC)),
        );

        Router::new()
            .route("/", get(|| async { "through" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                enforce_tenant_limit,
            ))
    }

    fn request(tenant: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_requests_without_tenant() {
        let app = app(10);

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Missing tenant ID"})
        );

        let response = app.oneshot(request(Some(""))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lets_requests_through_until_limited() {
        let app = app(2);

        for _ in 0..2 {
            let response = app.clone().oneshot(request(Some("acme"))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request(Some("acme"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Rate limit exceeded", "limit": 2, "windowMs": 60000})
        );

        // Other tenants are unaffected.
        let response = app.oneshot(request(Some("globex"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
