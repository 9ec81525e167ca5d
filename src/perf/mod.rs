//! Per-operation timing statistics and the request-batching layer.
//!
//! Mean-only statistics by choice: the recorder surfaces tail-latency
//! offenders by sorting on average duration, not by volume. No percentile
//! bucketing is kept.

pub mod batch;

use crate::utils::fmt_duration;
use dashmap::DashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// A single call above this threshold is logged as a warning.
const SLOW_CALL_THRESHOLD: Duration = Duration::from_secs(1);

/// How many operations `summary` reports.
const SUMMARY_TOP_N: usize = 10;

#[derive(Default, Clone)]
struct Accum {
    count: u64,
    total: Duration,
    avg: Duration,
}

/// Snapshot of one operation's accumulated timings.
#[derive(Debug, Clone)]
pub struct OperationMetric {
    pub operation: String,
    pub count: u64,
    pub total: Duration,
    pub avg: Duration,
}

/// Aggregate view: total call count plus the slowest operations by mean.
#[derive(Debug, Clone)]
pub struct PerfSummary {
    pub total_operations: u64,
    pub slowest: Vec<OperationMetric>,
}

/// Accumulates count / total / mean duration per operation name.
#[derive(Default)]
pub struct PerformanceRecorder {
    metrics: DashMap<String, Accum>,
}

impl PerformanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observed duration into the operation's running statistics.
    pub fn record(&self, operation: &str, duration: Duration) {
        let mut accum = self.metrics.entry(operation.to_owned()).or_default();
        accum.count += 1;
        accum.total += duration;
        accum.avg = accum.total / accum.count as u32;
    }

    /// All operations, in no particular order.
    pub fn metrics(&self) -> Vec<OperationMetric> {
        self.metrics
            .iter()
            .map(|entry| OperationMetric {
                operation: entry.key().clone(),
                count: entry.count,
                total: entry.total,
                avg: entry.avg,
            })
            .collect()
    }

    /// Top operations sorted by mean duration, slowest first.
    pub fn summary(&self) -> PerfSummary {
        let mut all = self.metrics();
        let total_operations = all.iter().map(|m| m.count).sum();
        all.sort_by(|a, b| b.avg.cmp(&a.avg));
        all.truncate(SUMMARY_TOP_N);
        PerfSummary {
            total_operations,
            slowest: all,
        }
    }
}

/// Time a fallible async operation, recording its duration under `operation`.
///
/// Failures are booked under `"{operation}:error"` so failure latency does
/// not pollute the success mean. Calls slower than [`SLOW_CALL_THRESHOLD`]
/// are logged.
pub async fn timed<T, E, Fut>(
    recorder: &PerformanceRecorder,
    operation: &str,
    fut: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            recorder.record(operation, elapsed);
            if elapsed > SLOW_CALL_THRESHOLD {
                warn!(operation, duration = fmt_duration(elapsed), "slow operation");
            }
        }
        Err(_) => {
            recorder.record(&format!("{operation}:error"), elapsed);
        }
    }
    result
}
