#![allow(dead_code)]

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use enrichment_api::config::{Config, EnvMsDuration, TenantLimitConfig};
use enrichment_api::server::serve;
use tenant_limiter::TENANT_HEADER;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
    export_prometheus: false,
    enricher_url: None,
    enricher_timeout: EnvMsDuration::from_str("2000").unwrap(),
    simulated_latency: EnvMsDuration::from_str("1").unwrap(),
    default_concurrency: 50,
    max_concurrency: 1024,
    tenant_limits: TenantLimitConfig {
        tenant_limit: NonZeroU32::new(100).unwrap(),
        tenant_window: EnvMsDuration::from_str("60000").unwrap(),
    },
});

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await }).await
        });
        ServerHandle { addr, shutdown }
    }

    pub async fn send_process_request<T: Into<reqwest::Body>>(
        &self,
        tenant: Option<&str>,
        body: T,
    ) -> reqwest::Response {
        let client = reqwest::Client::new();
        let mut request = client
            .post(format!("http://{:?}/users/process", self.addr))
            .body(body)
            .header(CONTENT_TYPE, "application/json");
        if let Some(tenant) = tenant {
            request = request.header(TENANT_HEADER, tenant);
        }
        request.send().await.expect("failed to send request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(format!("http://{:?}{}", self.addr, path))
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

/// A lookup service that knows a fixed set of users and answers 404 for the rest.
pub struct LookupServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl LookupServer {
    pub async fn start(known: &[(&str, &str)]) -> LookupServer {
        let known: Arc<Vec<(String, String)>> = Arc::new(
            known
                .iter()
                .map(|(id, email)| (id.to_string(), email.to_string()))
                .collect(),
        );

        let app = Router::new().route(
            "/users/:id",
            get(move |Path(id): Path<String>| {
                let known = known.clone();
                async move {
                    match known.iter().find(|(known_id, _)| *known_id == id) {
                        Some((_, email)) => Ok(Json(json!({ "email": email }))),
                        None => Err(StatusCode::NOT_FOUND),
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notify.notified().await })
                .await
        });
        LookupServer { addr, shutdown }
    }

    pub fn url(&self) -> String {
        format!("http://{:?}", self.addr)
    }
}

impl Drop for LookupServer {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

pub fn emails(body: &Value) -> Vec<String> {
    body["users"]
        .as_array()
        .expect("users is not an array")
        .iter()
        .map(|user| user["email"].as_str().unwrap_or_default().to_string())
        .collect()
}
