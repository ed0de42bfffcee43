use tracing::error;

use crate::error::EnrichmentError;
use crate::record::UserId;

/// Receives every failed enrichment. Called from pipeline workers, so
/// implementations must return promptly and never block on I/O.
pub trait DiagnosticSink {
    fn enrichment_failed(&self, id: &UserId, error: &EnrichmentError);
}

/// Reports enrichment failures as error events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn enrichment_failed(&self, id: &UserId, error: &EnrichmentError) {
        error!(user_id = %id, "failed to enrich user: {}", error);
    }
}
