use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use dashmap::DashSet;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument};

use crate::diagnostics::{DiagnosticSink, TracingDiagnostics};
use crate::enricher::Enricher;
use crate::error::EnrichmentError;
use crate::record::UserRecord;

/// Worker count used when the caller has no preference.
pub const DEFAULT_CONCURRENCY: usize = 50;

/// What happened to a single input record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    /// First record to present its dedup key: kept in the output.
    Admitted,
    /// Another record already holds the same dedup key.
    Duplicate,
    /// The record had no email and the lookup did not produce one.
    EnrichmentFailed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub received: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub enrichment_failures: usize,
    /// Successful lookups, whether or not the record was later admitted.
    pub enriched: usize,
}

#[derive(Debug)]
pub struct PipelineReport {
    /// Surviving records, in input order.
    pub records: Vec<UserRecord>,
    /// One entry per input index. `None` only if the worker holding that
    /// index panicked outside of the lookup.
    pub outcomes: Vec<Option<RecordOutcome>>,
    pub stats: PipelineStats,
}

/// Shared state for a single run. Dropped once the output is compacted.
struct PipelineState {
    records: Vec<UserRecord>,
    claim_cursor: AtomicUsize,
    seen_keys: DashSet<String>,
    result_slots: Vec<OnceLock<UserRecord>>,
    outcome_slots: Vec<OnceLock<RecordOutcome>>,
    enriched: AtomicUsize,
}

impl PipelineState {
    fn new(records: Vec<UserRecord>) -> Self {
        let len = records.len();
        Self {
            records,
            claim_cursor: AtomicUsize::new(0),
            seen_keys: DashSet::new(),
            result_slots: (0..len).map(|_| OnceLock::new()).collect(),
            outcome_slots: (0..len).map(|_| OnceLock::new()).collect(),
            enriched: AtomicUsize::new(0),
        }
    }

    /// Reserve the next unclaimed index. The cursor never moves past the
    /// input length, so every successful claim is a real one.
    fn claim(&self) -> Option<usize> {
        let len = self.records.len();
        self.claim_cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < len).then_some(next + 1)
            })
            .ok()
    }

    /// Insert-if-absent on the dedup set. Returns true for the one caller
    /// that gets to keep `key`.
    fn admit(&self, key: String) -> bool {
        self.seen_keys.insert(key)
    }

    fn fill_slot(&self, index: usize, record: UserRecord) {
        if self.result_slots[index].set(record).is_err() {
            error!(index, "result slot written twice");
        }
    }

    fn record_outcome(&self, index: usize, outcome: RecordOutcome) {
        if self.outcome_slots[index].set(outcome).is_err() {
            error!(index, "outcome recorded twice");
        }
    }

    fn into_report(self) -> PipelineReport {
        let outcomes: Vec<Option<RecordOutcome>> = self
            .outcome_slots
            .into_iter()
            .map(OnceLock::into_inner)
            .collect();
        let records: Vec<UserRecord> = self
            .result_slots
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect();
        let stats = PipelineStats::from_outcomes(
            self.records.len(),
            &outcomes,
            self.enriched.into_inner(),
        );

        PipelineReport {
            records,
            outcomes,
            stats,
        }
    }
}

impl PipelineStats {
    fn from_outcomes(received: usize, outcomes: &[Option<RecordOutcome>], enriched: usize) -> Self {
        outcomes.iter().flatten().fold(
            PipelineStats {
                received,
                enriched,
                ..Default::default()
            },
            |mut stats, outcome| {
                match outcome {
                    RecordOutcome::Admitted => stats.admitted += 1,
                    RecordOutcome::Duplicate => stats.duplicates += 1,
                    RecordOutcome::EnrichmentFailed => stats.enrichment_failures += 1,
                }
                stats
            },
        )
    }
}

/// Enriches and deduplicates batches of user records with a bounded number
/// of concurrent workers.
///
/// Workers race on a shared claim cursor and a shared dedup set. When two
/// records share a dedup key, whichever worker admits its key first keeps
/// its record: this is not necessarily the lowest input index. The output is
/// always in input order and never holds two records with the same key.
#[derive(Clone)]
pub struct Pipeline {
    enricher: Arc<dyn Enricher + Send + Sync>,
    diagnostics: Arc<dyn DiagnosticSink + Send + Sync>,
}

impl Pipeline {
    pub fn new<E>(enricher: E) -> Self
    where
        E: Enricher + Send + Sync + 'static,
    {
        Self {
            enricher: Arc::new(enricher),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_diagnostics<D>(mut self, diagnostics: D) -> Self
    where
        D: DiagnosticSink + Send + Sync + 'static,
    {
        self.diagnostics = Arc::new(diagnostics);
        self
    }

    /// Enrich and deduplicate `records`, returning the survivors in input order.
    pub async fn process(&self, records: Vec<UserRecord>, concurrency: usize) -> Vec<UserRecord> {
        self.process_with_report(records, concurrency).await.records
    }

    /// Like `process`, also reporting what happened to every input record.
    #[instrument(skip_all, fields(records = records.len(), workers))]
    pub async fn process_with_report(
        &self,
        records: Vec<UserRecord>,
        concurrency: usize,
    ) -> PipelineReport {
        let received = records.len();
        let workers = concurrency.max(1).min(received);
        tracing::Span::current().record("workers", workers);

        let start = Instant::now();
        let state = Arc::new(PipelineState::new(records));

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let worker = Worker {
                state: state.clone(),
                enricher: self.enricher.clone(),
                diagnostics: self.diagnostics.clone(),
            };
            tasks.spawn(worker.run());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("pipeline worker exited abnormally: {}", e);
            }
        }

        let report = match Arc::try_unwrap(state) {
            Ok(state) => state.into_report(),
            Err(_) => {
                error!("pipeline state still shared after all workers joined");
                PipelineReport {
                    records: Vec::new(),
                    outcomes: vec![None; received],
                    stats: PipelineStats {
                        received,
                        ..Default::default()
                    },
                }
            }
        };

        metrics::counter!("pipeline_records_total").increment(received as u64);
        metrics::counter!("pipeline_records_enriched_total")
            .increment(report.stats.enriched as u64);
        metrics::counter!("pipeline_duplicates_total").increment(report.stats.duplicates as u64);
        metrics::histogram!("pipeline_duration_seconds").record(start.elapsed().as_secs_f64());

        debug!(stats = ?report.stats, "pipeline run finished");

        report
    }
}

/// Loops over claims until the cursor is exhausted.
struct Worker {
    state: Arc<PipelineState>,
    enricher: Arc<dyn Enricher + Send + Sync>,
    diagnostics: Arc<dyn DiagnosticSink + Send + Sync>,
}

impl Worker {
    async fn run(self) {
        while let Some(index) = self.state.claim() {
            let outcome = self.handle(index).await;
            self.state.record_outcome(index, outcome);
        }
    }

    async fn handle(&self, index: usize) -> RecordOutcome {
        let mut record = self.state.records[index].clone();

        if record.needs_enrichment() {
            match self.enrich(&record).await {
                Ok(email) => {
                    self.state.enriched.fetch_add(1, Ordering::AcqRel);
                    record.email = Some(email);
                }
                Err(error) => {
                    metrics::counter!("pipeline_enrichment_failures_total").increment(1);
                    self.diagnostics.enrichment_failed(&record.id, &error);
                    return RecordOutcome::EnrichmentFailed;
                }
            }
        }

        let Some(key) = record.dedup_key() else {
            return RecordOutcome::EnrichmentFailed;
        };

        if self.state.admit(key) {
            self.state.fill_slot(index, record);
            RecordOutcome::Admitted
        } else {
            debug!(index, user_id = %record.id, "skipping duplicate user");
            RecordOutcome::Duplicate
        }
    }

    /// Runs the lookup on its own task so a panicking enricher fails only
    /// this record, not the worker.
    async fn enrich(&self, record: &UserRecord) -> Result<String, EnrichmentError> {
        let enricher = self.enricher.clone();
        let id = record.id.clone();
        let fields = tokio::spawn(async move { enricher.lookup(&id).await })
            .await
            .map_err(|e| EnrichmentError::LookupPanicked(e.to_string()))??;
        if fields.email.is_empty() {
            return Err(EnrichmentError::EmptyEmail);
        }
        Ok(fields.email)
    }
}
