//! Persistence and cached read paths for regulatory updates.

use crate::cache::keys;
use crate::cache::{Cached, MemoryCache, cached};
use crate::collector::RecordSink;
use crate::data::models::{RegulatoryUpdate, normalized_title};
use crate::perf::batch::BatchLoader;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound for the uncached list snapshot.
const LIST_LIMIT: i64 = 500;

/// Max point reads coalesced into one `ANY($1)` query.
const LOADER_BATCH_SIZE: usize = 100;

const SELECT: &str = "SELECT id, source_id, title, description, document_url, source_url, \
     update_type, jurisdiction, tags, published_date FROM regulatory_updates";

pub async fn create(pool: &PgPool, update: &RegulatoryUpdate) -> Result<String> {
    sqlx::query_scalar(
        "INSERT INTO regulatory_updates \
         (id, source_id, title, hashed_title, description, document_url, source_url, \
          update_type, jurisdiction, tags, published_date, created_at, updated_at) \
         VALUES (gen_random_uuid()::text, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now()) \
         RETURNING id",
    )
    .bind(&update.source_id)
    .bind(&update.title)
    .bind(normalized_title(&update.title))
    .bind(&update.description)
    .bind(&update.document_url)
    .bind(&update.source_url)
    .bind(&update.update_type)
    .bind(&update.jurisdiction)
    .bind(&update.tags)
    .bind(update.published_date)
    .fetch_one(pool)
    .await
    .map_err(anyhow::Error::from)
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<RegulatoryUpdate>> {
    sqlx::query_as::<_, RegulatoryUpdate>(&format!(
        "{SELECT} ORDER BY published_date DESC NULLS LAST, created_at DESC LIMIT $1"
    ))
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(anyhow::Error::from)
}

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<RegulatoryUpdate>> {
    sqlx::query_as::<_, RegulatoryUpdate>(&format!("{SELECT} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(anyhow::Error::from)
}

/// List snapshot through the entity cache.
pub async fn list_all_cached(
    pool: &PgPool,
    cache: &MemoryCache<Cached<RegulatoryUpdate>>,
) -> Result<Arc<Vec<RegulatoryUpdate>>> {
    let hit = cached(cache, &keys::all_regulatory_updates(), async {
        Ok(Cached::many(list_all(pool).await?))
    })
    .await?;
    hit.as_many()
        .context("list key unexpectedly held a single record")
}

/// Point read through the entity cache. Absent rows are not cached.
pub async fn get_cached(
    pool: &PgPool,
    cache: &MemoryCache<Cached<RegulatoryUpdate>>,
    id: &str,
) -> Result<Option<Arc<RegulatoryUpdate>>> {
    let key = keys::regulatory_update(id);
    if let Some(hit) = cache.get(&key) {
        return Ok(hit.as_one());
    }
    match get(pool, id).await? {
        Some(row) => {
            let value = Cached::one(row);
            cache.set(key, value.clone());
            Ok(value.as_one())
        }
        None => Ok(None),
    }
}

/// Batch loader coalescing repeated single-id reads into one `ANY` query.
///
/// Returns `None` per id with no matching row.
pub fn loader(pool: PgPool) -> BatchLoader<String, Option<RegulatoryUpdate>> {
    BatchLoader::new(LOADER_BATCH_SIZE, move |ids: Vec<String>| {
        let pool = pool.clone();
        async move {
            let rows = sqlx::query_as::<_, RegulatoryUpdate>(&format!(
                "{SELECT} WHERE id = ANY($1)"
            ))
            .bind(&ids)
            .fetch_all(&pool)
            .await?;
            let mut by_id: HashMap<String, RegulatoryUpdate> = rows
                .into_iter()
                .filter_map(|row| row.id.clone().map(|id| (id, row)))
                .collect();
            Ok(ids.iter().map(|id| by_id.remove(id)).collect())
        }
        .boxed()
    })
}

/// Collector sink: inserts one update and invalidates the exact cache keys
/// the write could have affected.
pub struct RegulatoryUpdateSink {
    pool: PgPool,
    cache: Arc<MemoryCache<Cached<RegulatoryUpdate>>>,
}

impl RegulatoryUpdateSink {
    pub fn new(pool: PgPool, cache: Arc<MemoryCache<Cached<RegulatoryUpdate>>>) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl RecordSink<RegulatoryUpdate> for RegulatoryUpdateSink {
    async fn create(&self, record: &RegulatoryUpdate) -> Result<()> {
        let id = create(&self.pool, record).await?;
        keys::invalidate_regulatory_update(&self.cache, Some(&id));
        Ok(())
    }
}
