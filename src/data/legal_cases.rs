//! Persistence and cached read paths for legal cases.

use crate::cache::keys;
use crate::cache::{Cached, MemoryCache, cached};
use crate::collector::RecordSink;
use crate::data::models::LegalCase;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

const LIST_LIMIT: i64 = 500;

const SELECT: &str = "SELECT id, case_number, title, court, jurisdiction, region, filed_date, \
     status, description, document_url, source_id, case_type FROM legal_cases";

pub async fn create(pool: &PgPool, case: &LegalCase) -> Result<String> {
    sqlx::query_scalar(
        "INSERT INTO legal_cases \
         (id, case_number, title, court, jurisdiction, region, filed_date, status, \
          description, document_url, source_id, case_type, created_at, updated_at) \
         VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now(), now()) \
         RETURNING id",
    )
    .bind(&case.case_number)
    .bind(&case.title)
    .bind(&case.court)
    .bind(&case.jurisdiction)
    .bind(&case.region)
    .bind(case.filed_date)
    .bind(&case.status)
    .bind(&case.description)
    .bind(&case.document_url)
    .bind(&case.source_id)
    .bind(&case.case_type)
    .fetch_one(pool)
    .await
    .map_err(anyhow::Error::from)
}

pub async fn list_by_jurisdiction(pool: &PgPool, jurisdiction: &str) -> Result<Vec<LegalCase>> {
    sqlx::query_as::<_, LegalCase>(&format!(
        "{SELECT} WHERE jurisdiction = $1 ORDER BY filed_date DESC NULLS LAST LIMIT $2"
    ))
    .bind(jurisdiction)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(anyhow::Error::from)
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<LegalCase>> {
    sqlx::query_as::<_, LegalCase>(&format!(
        "{SELECT} ORDER BY filed_date DESC NULLS LAST LIMIT $1"
    ))
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(anyhow::Error::from)
}

/// Per-jurisdiction list through the entity cache (legal cases are
/// historically stable, so this cache carries the longest TTL).
pub async fn list_by_jurisdiction_cached(
    pool: &PgPool,
    cache: &MemoryCache<Cached<LegalCase>>,
    jurisdiction: &str,
) -> Result<Arc<Vec<LegalCase>>> {
    let hit = cached(cache, &keys::legal_cases_by_jurisdiction(jurisdiction), async {
        Ok(Cached::many(list_by_jurisdiction(pool, jurisdiction).await?))
    })
    .await?;
    hit.as_many()
        .context("list key unexpectedly held a single record")
}

/// Collector sink for legal cases.
pub struct LegalCaseSink {
    pool: PgPool,
    cache: Arc<MemoryCache<Cached<LegalCase>>>,
}

impl LegalCaseSink {
    pub fn new(pool: PgPool, cache: Arc<MemoryCache<Cached<LegalCase>>>) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl RecordSink<LegalCase> for LegalCaseSink {
    async fn create(&self, record: &LegalCase) -> Result<()> {
        create(&self.pool, record).await?;
        keys::invalidate_legal_cases(&self.cache, Some(&record.jurisdiction));
        Ok(())
    }
}
