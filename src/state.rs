//! Application state shared across the import pipeline and read paths.
//!
//! One cache instance per entity category, wired explicitly here at
//! startup; each category's capacity and TTL follow its volatility
//! (legal cases are historical and cache longest, regulatory updates
//! change more often).

use crate::cache::{Cached, MemoryCache};
use crate::data::models::{LegalCase, Patent, RegulatoryUpdate};
use crate::data::{DbContext, legal_cases, patents, regulatory_updates};
use crate::perf::batch::{BatchError, BatchLoader};
use crate::perf::{PerformanceRecorder, timed};
use crate::utils::fmt_duration;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const REGULATORY_CACHE_SIZE: usize = 1000;
const REGULATORY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

const LEGAL_CACHE_SIZE: usize = 500;
const LEGAL_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

const PATENT_CACHE_SIZE: usize = 500;
const PATENT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct AppState {
    pub db: DbContext,
    pub regulatory_updates_cache: Arc<MemoryCache<Cached<RegulatoryUpdate>>>,
    pub legal_cases_cache: Arc<MemoryCache<Cached<LegalCase>>>,
    pub patents_cache: Arc<MemoryCache<Cached<Patent>>>,
    pub perf: Arc<PerformanceRecorder>,
    /// Coalesces repeated single-id reads into one `ANY` query.
    pub regulatory_update_loader: BatchLoader<String, Option<RegulatoryUpdate>>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            regulatory_update_loader: regulatory_updates::loader(pool.clone()),
            db: DbContext::new(pool),
            regulatory_updates_cache: Arc::new(MemoryCache::new(
                "regulatory_updates",
                REGULATORY_CACHE_SIZE,
                REGULATORY_CACHE_TTL,
            )),
            legal_cases_cache: Arc::new(MemoryCache::new(
                "legal_cases",
                LEGAL_CACHE_SIZE,
                LEGAL_CACHE_TTL,
            )),
            patents_cache: Arc::new(MemoryCache::new(
                "patents",
                PATENT_CACHE_SIZE,
                PATENT_CACHE_TTL,
            )),
            perf: Arc::new(PerformanceRecorder::new()),
        }
    }

    /// Cached list of recent regulatory updates.
    pub async fn regulatory_updates(&self) -> Result<Arc<Vec<RegulatoryUpdate>>> {
        timed(
            &self.perf,
            "regulatory_updates.list",
            regulatory_updates::list_all_cached(self.db.pool(), &self.regulatory_updates_cache),
        )
        .await
    }

    /// Cached point read of one regulatory update.
    pub async fn regulatory_update(&self, id: &str) -> Result<Option<Arc<RegulatoryUpdate>>> {
        timed(
            &self.perf,
            "regulatory_updates.get",
            regulatory_updates::get_cached(self.db.pool(), &self.regulatory_updates_cache, id),
        )
        .await
    }

    /// Batched point read; concurrent callers within the window share one query.
    pub async fn regulatory_update_batched(
        &self,
        id: &str,
    ) -> Result<Option<RegulatoryUpdate>, BatchError> {
        self.regulatory_update_loader.load(id.to_owned()).await
    }

    /// Cached per-jurisdiction legal case list.
    pub async fn legal_cases(&self, jurisdiction: &str) -> Result<Arc<Vec<LegalCase>>> {
        timed(
            &self.perf,
            "legal_cases.list",
            legal_cases::list_by_jurisdiction_cached(
                self.db.pool(),
                &self.legal_cases_cache,
                jurisdiction,
            ),
        )
        .await
    }

    /// Cached recent-patents list.
    pub async fn patents(&self) -> Result<Arc<Vec<Patent>>> {
        timed(
            &self.perf,
            "patents.list",
            patents::list_recent_cached(self.db.pool(), &self.patents_cache),
        )
        .await
    }

    /// Log per-cache occupancy and the slowest operations observed so far.
    pub fn log_health(&self) {
        info!(
            regulatory_updates = self.regulatory_updates_cache.size(),
            regulatory_updates_max = self.regulatory_updates_cache.max_size(),
            legal_cases = self.legal_cases_cache.size(),
            legal_cases_max = self.legal_cases_cache.max_size(),
            patents = self.patents_cache.size(),
            patents_max = self.patents_cache.max_size(),
            "cache occupancy"
        );
        let summary = self.perf.summary();
        info!(
            total_operations = summary.total_operations,
            "performance summary"
        );
        for metric in &summary.slowest {
            info!(
                operation = %metric.operation,
                count = metric.count,
                avg = fmt_duration(metric.avg),
                total = fmt_duration(metric.total),
                "operation timing"
            );
        }
    }
}
