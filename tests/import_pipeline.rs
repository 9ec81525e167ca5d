//! End-to-end exercise of the import pipeline: source adapters feeding a
//! collector, wrapped as orchestrator jobs, with in-memory sinks.

use anyhow::Result;
use async_trait::async_trait;
use regwatch::collector::{NaturalKeyed, RecordSink, SourceCollector};
use regwatch::perf::PerformanceRecorder;
use regwatch::scheduler::{ImportJob, JobRunner, Orchestrator};
use regwatch::sources::{FetchOutcome, SourceAdapter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Item {
    key: String,
    payload: u32,
}

impl Item {
    fn new(key: &str, payload: u32) -> Self {
        Self {
            key: key.to_owned(),
            payload,
        }
    }
}

impl NaturalKeyed for Item {
    fn natural_key(&self) -> String {
        self.key.clone()
    }
}

struct StaticSource {
    name: &'static str,
    items: Vec<Item>,
}

#[async_trait]
impl SourceAdapter<Item> for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _limit: u32) -> Result<FetchOutcome<Item>> {
        Ok(FetchOutcome::Fetched(self.items.clone()))
    }
}

struct BrokenSource;

#[async_trait]
impl SourceAdapter<Item> for BrokenSource {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn fetch(&self, _limit: u32) -> Result<FetchOutcome<Item>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

#[derive(Default, Clone)]
struct VecSink {
    stored: Arc<Mutex<Vec<Item>>>,
}

#[async_trait]
impl RecordSink<Item> for VecSink {
    async fn create(&self, record: &Item) -> Result<()> {
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct CollectorRun {
    collector: SourceCollector<Item>,
    sink: VecSink,
}

#[async_trait]
impl JobRunner for CollectorRun {
    async fn run(&self) -> Result<()> {
        let summary = self.collector.collect_into(&self.sink).await;
        if summary.collected == 0 && !summary.errors.is_empty() {
            anyhow::bail!("all sources failed");
        }
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl JobRunner for AlwaysFails {
    async fn run(&self) -> Result<()> {
        anyhow::bail!("scheduled source is down")
    }
}

#[tokio::test]
async fn a_full_cycle_dedupes_records_and_tolerates_a_broken_source() {
    let perf = Arc::new(PerformanceRecorder::new());
    let adapters: Vec<Box<dyn SourceAdapter<Item>>> = vec![
        Box::new(StaticSource {
            name: "primary",
            items: vec![Item::new("US1", 1), Item::new("US2", 1)],
        }),
        Box::new(BrokenSource),
        Box::new(StaticSource {
            name: "secondary",
            items: vec![Item::new("US2", 2), Item::new("US3", 2)],
        }),
    ];
    let collector = SourceCollector::new(adapters, Duration::ZERO, 20, Arc::clone(&perf));
    let sink = VecSink::default();

    let summary = collector.collect_into(&sink).await;

    assert_eq!(summary.collected, 3);
    assert_eq!(summary.stored, 3);
    assert_eq!(summary.errors.len(), 1);

    // First-seen-wins: US2 keeps the primary source's payload.
    let stored = sink.stored.lock().unwrap();
    assert_eq!(
        *stored,
        vec![Item::new("US1", 1), Item::new("US2", 1), Item::new("US3", 2)]
    );
}

#[tokio::test]
async fn a_run_with_only_non_critical_failures_reports_success() {
    let perf = Arc::new(PerformanceRecorder::new());
    let collector = SourceCollector::new(
        vec![Box::new(StaticSource {
            name: "primary",
            items: vec![Item::new("A", 1)],
        }) as Box<dyn SourceAdapter<Item>>],
        Duration::ZERO,
        20,
        Arc::clone(&perf),
    );
    let sink = VecSink::default();

    let jobs = vec![
        ImportJob::new(
            "collector",
            true,
            Box::new(CollectorRun {
                collector,
                sink: sink.clone(),
            }),
        ),
        ImportJob::new("best-effort", false, Box::new(AlwaysFails)),
    ];
    let orchestrator = Orchestrator::with_timing(
        jobs,
        perf,
        Duration::from_secs(5),
        Duration::ZERO,
    );

    let report = orchestrator.run().await;

    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.critical_failed, 0);
    assert!(report.overall_success());
    assert_eq!(sink.stored.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn a_critical_job_failure_fails_the_whole_run() {
    let perf = Arc::new(PerformanceRecorder::new());
    let jobs = vec![
        ImportJob::new("critical-source", true, Box::new(AlwaysFails)),
        ImportJob::new("best-effort", false, Box::new(AlwaysFails)),
    ];
    let orchestrator = Orchestrator::with_timing(
        jobs,
        perf,
        Duration::from_secs(5),
        Duration::ZERO,
    );

    let report = orchestrator.run().await;

    assert_eq!(report.critical_failed, 1);
    assert!(!report.overall_success());
}
