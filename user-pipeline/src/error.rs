use thiserror::Error;

/// Enumeration of the ways a lookup can fail to produce an email.
///
/// The pipeline handles every variant the same way (skip the record, report
/// it, move on); the variants exist for the diagnostics.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("lookup request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("lookup returned no email")]
    EmptyEmail,
    #[error("lookup failed: {0}")]
    LookupFailed(String),
    #[error("lookup task panicked: {0}")]
    LookupPanicked(String),
}
