//! Multi-source collection: call every adapter in order, merge, dedupe,
//! persist.
//!
//! Adapters run strictly sequentially with a fixed courtesy delay before
//! each call. That bounds outbound concurrency against rate-limited third
//! parties and keeps persistence writes serialized. Failures are converted
//! into data at the smallest boundary (per adapter, per record) so one bad
//! source or row never aborts the rest of the run.

use crate::perf::{PerformanceRecorder, timed};
use crate::sources::{FetchOutcome, SourceAdapter};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A record carrying a domain-meaningful unique identifier.
pub trait NaturalKeyed {
    fn natural_key(&self) -> String;
}

/// Where deduplicated records go. The sink must tolerate duplicate natural
/// keys across separate runs; the collector only deduplicates within one.
#[async_trait]
pub trait RecordSink<R>: Send + Sync {
    async fn create(&self, record: &R) -> Result<()>;
}

/// Outcome of one collection run.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    /// Unique records after first-seen-wins deduplication.
    pub collected: usize,
    /// Records actually persisted (failed inserts are logged, not fatal).
    pub stored: usize,
    /// One entry per failed source.
    pub errors: Vec<String>,
}

/// Collects records from an ordered list of source adapters.
///
/// Adapter order is significant: when two sources report the same natural
/// key, the earlier adapter's record wins and the later duplicate is
/// dropped, not merged.
pub struct SourceCollector<R> {
    adapters: Vec<Box<dyn SourceAdapter<R>>>,
    request_delay: Duration,
    fetch_limit: u32,
    perf: Arc<PerformanceRecorder>,
}

impl<R: NaturalKeyed + Send + Sync> SourceCollector<R> {
    pub fn new(
        adapters: Vec<Box<dyn SourceAdapter<R>>>,
        request_delay: Duration,
        fetch_limit: u32,
        perf: Arc<PerformanceRecorder>,
    ) -> Self {
        Self {
            adapters,
            request_delay,
            fetch_limit,
            perf,
        }
    }

    /// Run every adapter, deduplicate the merged result, persist it.
    pub async fn collect_into(&self, sink: &dyn RecordSink<R>) -> CollectionSummary {
        let start = Instant::now();
        let mut errors = Vec::new();
        let mut merged: Vec<R> = Vec::new();

        for adapter in &self.adapters {
            tokio::time::sleep(self.request_delay).await;
            let operation = format!("source:{}", adapter.name());
            match timed(&self.perf, &operation, adapter.fetch(self.fetch_limit)).await {
                Ok(FetchOutcome::Fetched(records)) => {
                    info!(
                        source = adapter.name(),
                        count = records.len(),
                        "source fetched"
                    );
                    merged.extend(records);
                }
                Ok(FetchOutcome::Skipped(reason)) => {
                    info!(source = adapter.name(), reason, "source skipped");
                }
                Err(e) => {
                    error!(source = adapter.name(), error = ?e, "source fetch failed");
                    errors.push(format!("{}: {e:#}", adapter.name()));
                }
            }
        }

        let unique = dedupe_first_seen(merged);

        let mut stored = 0;
        for record in &unique {
            match sink.create(record).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(key = %record.natural_key(), error = ?e, "failed to store record");
                }
            }
        }

        info!(
            collected = unique.len(),
            stored,
            source_errors = errors.len(),
            duration = crate::utils::fmt_duration(start.elapsed()),
            "collection run complete"
        );

        CollectionSummary {
            collected: unique.len(),
            stored,
            errors,
        }
    }
}

/// Keep the first occurrence of every natural key, in input order.
fn dedupe_first_seen<R: NaturalKeyed>(records: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());
    for record in records {
        let key = record.natural_key();
        if seen.insert(key.clone()) {
            unique.push(record);
        } else {
            debug!(key = %key, "dropping duplicate record");
        }
    }
    unique
}
