//! Persistence and cached read paths for patents.

use crate::cache::keys;
use crate::cache::{Cached, MemoryCache, cached};
use crate::collector::RecordSink;
use crate::data::models::Patent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

const LIST_LIMIT: i64 = 500;

const SELECT: &str = "SELECT id, publication_number, title, abstract, applicant, inventors, \
     publication_date, filing_date, status, jurisdiction, cpc_codes, document_url, source \
     FROM patents";

pub async fn create(pool: &PgPool, patent: &Patent) -> Result<String> {
    sqlx::query_scalar(
        "INSERT INTO patents \
         (id, publication_number, title, abstract, applicant, inventors, publication_date, \
          filing_date, status, jurisdiction, cpc_codes, document_url, source, created_at, updated_at) \
         VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), now()) \
         RETURNING id",
    )
    .bind(&patent.publication_number)
    .bind(&patent.title)
    .bind(&patent.abstract_text)
    .bind(&patent.applicant)
    .bind(&patent.inventors)
    .bind(patent.publication_date)
    .bind(patent.filing_date)
    .bind(&patent.status)
    .bind(&patent.jurisdiction)
    .bind(&patent.cpc_codes)
    .bind(&patent.document_url)
    .bind(&patent.source)
    .fetch_one(pool)
    .await
    .map_err(anyhow::Error::from)
}

pub async fn list_recent(pool: &PgPool) -> Result<Vec<Patent>> {
    sqlx::query_as::<_, Patent>(&format!(
        "{SELECT} ORDER BY publication_date DESC NULLS LAST LIMIT $1"
    ))
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(anyhow::Error::from)
}

/// Recent-patents snapshot through the entity cache.
pub async fn list_recent_cached(
    pool: &PgPool,
    cache: &MemoryCache<Cached<Patent>>,
) -> Result<Arc<Vec<Patent>>> {
    let hit = cached(cache, &keys::all_patents(), async {
        Ok(Cached::many(list_recent(pool).await?))
    })
    .await?;
    hit.as_many()
        .context("list key unexpectedly held a single record")
}

/// Collector sink for patents.
pub struct PatentSink {
    pool: PgPool,
    cache: Arc<MemoryCache<Cached<Patent>>>,
}

impl PatentSink {
    pub fn new(pool: PgPool, cache: Arc<MemoryCache<Cached<Patent>>>) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl RecordSink<Patent> for PatentSink {
    async fn create(&self, record: &Patent) -> Result<()> {
        create(&self.pool, record).await?;
        keys::invalidate_patents(&self.cache);
        Ok(())
    }
}
