//! Bounded-concurrency enrichment and deduplication of user records.
pub mod diagnostics;
pub mod enricher;
pub mod error;
pub mod pipeline;
pub mod record;
