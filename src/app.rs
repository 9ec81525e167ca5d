//! Application wiring: configuration, database pool, state, import jobs.

use crate::cli::Args;
use crate::collector::{CollectionSummary, NaturalKeyed, RecordSink, SourceCollector};
use crate::config::Config;
use crate::data::legal_cases::LegalCaseSink;
use crate::data::models::{LegalCase, Patent, RegulatoryUpdate};
use crate::data::patents::PatentSink;
use crate::data::regulatory_updates::RegulatoryUpdateSink;
use crate::scheduler::{ImportJob, JobRunner, Orchestrator};
use crate::sources;
use crate::sources::SourceAdapter;
use crate::sources::legal::{EurLexAdapter, GovInfoAdapter};
use crate::sources::patents::{LensAdapter, PatentsViewAdapter, UsptoOpenDataAdapter};
use crate::sources::regulatory::{FdaEnforcementAdapter, MdcgGuidanceAdapter, MhraAlertsAdapter};
use crate::state::AppState;
use crate::utils::fmt_duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::ConnectOptions;
use sqlx::postgres::PgPoolOptions;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

/// Main application struct containing all necessary components.
pub struct App {
    config: Config,
    state: AppState,
}

/// Bridges one collector run into the orchestrator's job contract.
///
/// Partial source failures are not job failures (they are already folded
/// into the summary's error list); the job only fails when every source
/// came back empty-handed with at least one error.
struct CollectorJob<R> {
    collector: SourceCollector<R>,
    sink: Box<dyn RecordSink<R>>,
}

#[async_trait]
impl<R: NaturalKeyed + Send + Sync + 'static> JobRunner for CollectorJob<R> {
    async fn run(&self) -> Result<()> {
        let summary = self.collector.collect_into(self.sink.as_ref()).await;
        fail_if_nothing_collected(&summary)
    }
}

fn fail_if_nothing_collected(summary: &CollectionSummary) -> Result<()> {
    if summary.collected == 0 && !summary.errors.is_empty() {
        anyhow::bail!("all sources failed: {}", summary.errors.join("; "));
    }
    Ok(())
}

impl App {
    /// Create a new App instance with all necessary components initialized.
    pub async fn new(config: Config) -> Result<Self> {
        let connect_options = sqlx::postgres::PgConnectOptions::from_str(&config.database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            min_connections = 0,
            max_connections = 4,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(Self {
            state: AppState::new(pool),
            config,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The fixed job list, in priority order. Regulatory updates are the
    /// source the business depends on, so that job is the critical one.
    fn import_jobs(&self) -> Result<Vec<ImportJob>> {
        let client = sources::http_client()?;
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let limit = self.config.fetch_limit;
        let pool = self.state.db.pool().clone();

        let regulatory_adapters: Vec<Box<dyn SourceAdapter<RegulatoryUpdate>>> = vec![
            Box::new(FdaEnforcementAdapter::new(client.clone())),
            Box::new(MdcgGuidanceAdapter::new(client.clone())),
            Box::new(MhraAlertsAdapter::new(client.clone())),
        ];
        let regulatory = CollectorJob {
            collector: SourceCollector::new(
                regulatory_adapters,
                delay,
                limit,
                self.state.perf.clone(),
            ),
            sink: Box::new(RegulatoryUpdateSink::new(
                pool.clone(),
                self.state.regulatory_updates_cache.clone(),
            )),
        };

        let legal_adapters: Vec<Box<dyn SourceAdapter<LegalCase>>> = vec![
            Box::new(GovInfoAdapter::new(
                client.clone(),
                self.config.govinfo_api_key.clone(),
            )),
            Box::new(EurLexAdapter::new(client.clone(), self.config.enable_eurlex)),
        ];
        let legal = CollectorJob {
            collector: SourceCollector::new(legal_adapters, delay, limit, self.state.perf.clone()),
            sink: Box::new(LegalCaseSink::new(
                pool.clone(),
                self.state.legal_cases_cache.clone(),
            )),
        };

        let patent_adapters: Vec<Box<dyn SourceAdapter<Patent>>> = vec![
            Box::new(UsptoOpenDataAdapter::new(client.clone())),
            Box::new(PatentsViewAdapter::new(
                client.clone(),
                self.config.patentsview_api_key.clone(),
            )),
            Box::new(LensAdapter::new(client, self.config.lens_api_token.clone())),
        ];
        let patents = CollectorJob {
            collector: SourceCollector::new(patent_adapters, delay, limit, self.state.perf.clone()),
            sink: Box::new(PatentSink::new(pool, self.state.patents_cache.clone())),
        };

        Ok(vec![
            ImportJob::new("regulatory-updates", true, Box::new(regulatory)),
            ImportJob::new("legal-cases", false, Box::new(legal)),
            ImportJob::new("patents", false, Box::new(patents)),
        ])
    }

    /// Run the import cycle (once, or on an interval with `--watch`) and
    /// map the outcome to a process exit code for the external scheduler.
    pub async fn run(&self, args: &Args) -> ExitCode {
        let mut jobs = match self.import_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = ?e, "Failed to build import jobs");
                return ExitCode::FAILURE;
            }
        };

        if let Some(only) = &args.only {
            jobs.retain(|job| job.name == only.as_str());
            if jobs.is_empty() {
                error!(job = %only, "Unknown import job");
                return ExitCode::FAILURE;
            }
        }

        let orchestrator = Orchestrator::new(jobs, self.state.perf.clone());

        if args.watch {
            let interval = Duration::from_secs(self.config.import_interval_minutes * 60);
            orchestrator.run_interval(interval).await;
            self.state.log_health();
            return ExitCode::SUCCESS;
        }

        let report = orchestrator.run().await;
        self.state.log_health();
        info!(
            duration = fmt_duration(report.total_duration),
            "run finished"
        );
        if report.overall_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_source_failure_is_not_a_job_failure() {
        let summary = CollectionSummary {
            collected: 12,
            stored: 12,
            errors: vec!["lens: 503".to_owned()],
        };
        assert!(fail_if_nothing_collected(&summary).is_ok());
    }

    #[test]
    fn total_source_failure_fails_the_job() {
        let summary = CollectionSummary {
            collected: 0,
            stored: 0,
            errors: vec!["a: down".to_owned(), "b: down".to_owned()],
        };
        let err = fail_if_nothing_collected(&summary).unwrap_err();
        assert!(err.to_string().contains("all sources failed"));
    }

    #[test]
    fn an_empty_run_with_no_errors_is_fine() {
        let summary = CollectionSummary {
            collected: 0,
            stored: 0,
            errors: vec![],
        };
        assert!(fail_if_nothing_collected(&summary).is_ok());
    }
}
