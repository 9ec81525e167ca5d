use sqlx::PgPool;

/// Shared handle to the Postgres pool.
///
/// Repos are free functions over `&PgPool`; this wrapper exists so wiring
/// code passes one clone-cheap context around instead of a raw pool.
#[derive(Clone)]
pub struct DbContext {
    pool: PgPool,
}

impl DbContext {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
