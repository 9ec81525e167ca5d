//! Scheduled import orchestration.
//!
//! Runs a fixed, ordered list of named import jobs strictly sequentially.
//! A failed job is recorded and execution proceeds; only jobs flagged
//! critical can fail the overall run. There is no retry state and no
//! durable queue: every invocation starts from scratch.

use crate::perf::{PerformanceRecorder, timed};
use crate::utils::fmt_duration;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Hard bound on a single job so one hung adapter cannot block the run.
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Pause between jobs to avoid back-to-back bursts across unrelated sources.
const DEFAULT_INTER_JOB_PAUSE: Duration = Duration::from_secs(1);

/// The unit of work behind one import job, typically a collector run.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// A named import job, fixed at startup.
pub struct ImportJob {
    pub name: &'static str,
    /// Failure of a critical job fails the whole run.
    pub critical: bool,
    pub runner: Box<dyn JobRunner>,
}

impl ImportJob {
    pub fn new(name: &'static str, critical: bool, runner: Box<dyn JobRunner>) -> Self {
        Self {
            name,
            critical,
            runner,
        }
    }
}

/// Outcome of one job execution. Created once, never mutated.
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub source: String,
    pub success: bool,
    /// 0 on success, 1 on failure, -1 on timeout.
    pub exit_code: i32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Aggregate report for one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<ImportResult>,
    pub successful: usize,
    pub failed: usize,
    pub critical_failed: usize,
    pub total_duration: Duration,
}

impl RunReport {
    /// Non-critical failures alone never fail the run.
    pub fn overall_success(&self) -> bool {
        self.critical_failed == 0
    }
}

/// Drives the fixed job list: one-shot via [`Orchestrator::run`], or
/// repeatedly via [`Orchestrator::run_interval`].
pub struct Orchestrator {
    jobs: Vec<ImportJob>,
    perf: Arc<PerformanceRecorder>,
    job_timeout: Duration,
    inter_job_pause: Duration,
}

impl Orchestrator {
    pub fn new(jobs: Vec<ImportJob>, perf: Arc<PerformanceRecorder>) -> Self {
        Self::with_timing(jobs, perf, DEFAULT_JOB_TIMEOUT, DEFAULT_INTER_JOB_PAUSE)
    }

    pub fn with_timing(
        jobs: Vec<ImportJob>,
        perf: Arc<PerformanceRecorder>,
        job_timeout: Duration,
        inter_job_pause: Duration,
    ) -> Self {
        Self {
            jobs,
            perf,
            job_timeout,
            inter_job_pause,
        }
    }

    /// Run every job once, in order, and aggregate the outcomes.
    pub async fn run(&self) -> RunReport {
        let run_start = Instant::now();
        info!(jobs = self.jobs.len(), "import run started");

        let mut results = Vec::with_capacity(self.jobs.len());
        for (idx, job) in self.jobs.iter().enumerate() {
            info!(job = job.name, critical = job.critical, "import job started");
            let start = Instant::now();

            let operation = format!("job:{}", job.name);
            let outcome = time::timeout(
                self.job_timeout,
                timed(&self.perf, &operation, job.runner.run()),
            )
            .await;
            let duration = start.elapsed();
            let duration_ms = duration.as_millis() as u64;

            let result = match outcome {
                Ok(Ok(())) => {
                    info!(
                        job = job.name,
                        duration = fmt_duration(duration),
                        "import job completed"
                    );
                    ImportResult {
                        source: job.name.to_owned(),
                        success: true,
                        exit_code: 0,
                        duration_ms,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    error!(job = job.name, duration = fmt_duration(duration), error = ?e, "import job failed");
                    ImportResult {
                        source: job.name.to_owned(),
                        success: false,
                        exit_code: 1,
                        duration_ms,
                        error: Some(format!("{e:#}")),
                    }
                }
                Err(_elapsed) => {
                    let message =
                        format!("job timed out after {}s", self.job_timeout.as_secs());
                    error!(job = job.name, timeout = ?self.job_timeout, "import job timed out");
                    ImportResult {
                        source: job.name.to_owned(),
                        success: false,
                        exit_code: -1,
                        duration_ms,
                        error: Some(message),
                    }
                }
            };
            results.push(result);

            if idx + 1 < self.jobs.len() {
                time::sleep(self.inter_job_pause).await;
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let critical_failed = results
            .iter()
            .zip(&self.jobs)
            .filter(|(r, job)| !r.success && job.critical)
            .count();
        let report = RunReport {
            results,
            successful,
            failed,
            critical_failed,
            total_duration: run_start.elapsed(),
        };
        self.log_report(&report);
        report
    }

    fn log_report(&self, report: &RunReport) {
        for (result, job) in report.results.iter().zip(&self.jobs) {
            if result.success {
                info!(
                    job = %result.source,
                    critical = job.critical,
                    duration_ms = result.duration_ms,
                    exit_code = result.exit_code,
                    "job result"
                );
            } else {
                error!(
                    job = %result.source,
                    critical = job.critical,
                    duration_ms = result.duration_ms,
                    exit_code = result.exit_code,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "job result"
                );
            }
        }
        if report.overall_success() {
            info!(
                successful = report.successful,
                failed = report.failed,
                duration = fmt_duration(report.total_duration),
                "import run complete"
            );
        } else {
            error!(
                successful = report.successful,
                failed = report.failed,
                critical_failed = report.critical_failed,
                duration = fmt_duration(report.total_duration),
                "import run complete with critical failures"
            );
        }
    }

    /// Repeat the import cycle every `every`, until ctrl-c.
    ///
    /// Cycles run inline, so a cycle that overruns the interval simply
    /// delays the next one; ticks never overlap.
    pub async fn run_interval(&self, every: Duration) {
        info!(interval = ?every, "interval import loop started");

        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal_token.cancel();
            }
        });

        let mut next_run = time::Instant::now();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("interval import loop shutting down");
                    break;
                }
                _ = time::sleep_until(next_run) => {
                    tokio::select! {
                        report = self.run() => {
                            if !report.overall_success() {
                                warn!(
                                    critical_failed = report.critical_failed,
                                    "import cycle had critical failures, continuing"
                                );
                            }
                        }
                        _ = cancel.cancelled() => {
                            info!("import cycle cancelled during shutdown");
                            break;
                        }
                    }
                    next_run = time::Instant::now() + every;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkJob;

    #[async_trait]
    impl JobRunner for OkJob {
        async fn run(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FailJob;

    #[async_trait]
    impl JobRunner for FailJob {
        async fn run(&self) -> Result<()> {
            anyhow::bail!("source unavailable")
        }
    }

    struct HangingJob;

    #[async_trait]
    impl JobRunner for HangingJob {
        async fn run(&self) -> Result<()> {
            time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn orchestrator(jobs: Vec<ImportJob>) -> Orchestrator {
        Orchestrator::with_timing(
            jobs,
            Arc::new(PerformanceRecorder::new()),
            Duration::from_millis(100),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn critical_failure_fails_the_run() {
        let jobs = vec![
            ImportJob::new("a", false, Box::new(OkJob)),
            ImportJob::new("b", true, Box::new(FailJob)),
            ImportJob::new("c", false, Box::new(OkJob)),
        ];
        let report = orchestrator(jobs).run().await;

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.critical_failed, 1);
        assert!(!report.overall_success());

        // Job b failed but c still ran.
        assert_eq!(report.results.len(), 3);
        assert!(report.results[2].success);
        assert_eq!(report.results[1].exit_code, 1);
        assert!(report.results[1].error.is_some());
    }

    #[tokio::test]
    async fn non_critical_failures_alone_never_fail_the_run() {
        let jobs = vec![
            ImportJob::new("a", false, Box::new(FailJob)),
            ImportJob::new("b", true, Box::new(OkJob)),
        ];
        let report = orchestrator(jobs).run().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.critical_failed, 0);
        assert!(report.overall_success());
    }

    #[tokio::test]
    async fn hung_job_times_out_and_the_run_proceeds() {
        let jobs = vec![
            ImportJob::new("hung", true, Box::new(HangingJob)),
            ImportJob::new("after", false, Box::new(OkJob)),
        ];
        let report = orchestrator(jobs).run().await;

        assert_eq!(report.results[0].exit_code, -1);
        assert!(
            report.results[0]
                .error
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
        assert!(report.results[1].success);
        assert!(!report.overall_success());
    }

    #[tokio::test]
    async fn job_durations_are_recorded() {
        let perf = Arc::new(PerformanceRecorder::new());
        let jobs = vec![
            ImportJob::new("a", false, Box::new(OkJob)),
            ImportJob::new("b", false, Box::new(FailJob)),
        ];
        let orchestrator = Orchestrator::with_timing(
            jobs,
            Arc::clone(&perf),
            Duration::from_millis(100),
            Duration::ZERO,
        );
        orchestrator.run().await;

        let metrics = perf.metrics();
        assert!(metrics.iter().any(|m| m.operation == "job:a"));
        assert!(metrics.iter().any(|m| m.operation == "job:b:error"));
    }
}
