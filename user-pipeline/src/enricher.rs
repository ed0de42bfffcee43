use std::time;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;
use crate::record::UserId;

/// The fragment of a user record a lookup can provide.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnrichedFields {
    pub email: String,
}

/// An external capability that fills in missing fields for a user.
///
/// Implementations may fail for any reason, transient or not: the pipeline
/// makes a single attempt per record and does not look at the error kind.
#[async_trait]
pub trait Enricher {
    async fn lookup(&self, id: &UserId) -> Result<EnrichedFields, EnrichmentError>;
}

/// Looks users up over HTTP with `GET {base_url}/users/{id}`.
pub struct HttpEnricher {
    base_url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpEnricher {
    pub fn new(base_url: reqwest::Url, timeout: time::Duration) -> Result<Self, EnrichmentError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("User Enrichment Pipeline")
            .timeout(timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    fn user_url(&self, id: &UserId) -> Result<reqwest::Url, EnrichmentError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                EnrichmentError::LookupFailed(format!("{} cannot be a base url", self.base_url))
            })?
            .pop_if_empty()
            .push("users")
            .push(&id.to_string());
        Ok(url)
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn lookup(&self, id: &UserId) -> Result<EnrichedFields, EnrichmentError> {
        let url = self.user_url(id)?;

        let fields = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<EnrichedFields>()
            .await?;

        if fields.email.is_empty() {
            return Err(EnrichmentError::EmptyEmail);
        }
        Ok(fields)
    }
}

/// Stand-in for a lookup service: waits `latency`, then answers
/// `user{id}@email.com` for every id.
#[derive(Clone, Debug)]
pub struct SimulatedEnricher {
    latency: time::Duration,
}

impl SimulatedEnricher {
    pub fn new(latency: time::Duration) -> Self {
        Self { latency }
    }
}

impl Default for SimulatedEnricher {
    fn default() -> Self {
        Self::new(time::Duration::from_millis(10))
    }
}

#[async_trait]
impl Enricher for SimulatedEnricher {
    async fn lookup(&self, id: &UserId) -> Result<EnrichedFields, EnrichmentError> {
        tokio::time::sleep(self.latency).await;
        Ok(EnrichedFields {
            email: format!("user{}@email.com", id),
        })
    }
}
