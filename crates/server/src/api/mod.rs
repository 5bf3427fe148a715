pub mod documents;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::{
    config::ServerConfig,
    db::{
        migrations::run_migrations,
        pool::{check_pool_health, create_pg_pool, PoolConfig},
    },
    store::DocumentStore,
};

/// Open the document store described by `config`.
///
/// With a database URL the pool is created, health-checked and migrated.
/// Without one documents live in process memory.
pub async fn build_store_from_config(config: &ServerConfig) -> Result<DocumentStore> {
    let Some(database_url) = config.database_url.as_deref() else {
        info!("no database configured, keeping documents in memory");
        return Ok(DocumentStore::memory());
    };

    let pool = create_pg_pool(database_url, PoolConfig::from_env(config.require_db_tls))
        .await
        .context("failed to initialize docket PostgreSQL pool")?;
    check_pool_health(&pool).await.context("docket PostgreSQL health check failed")?;
    run_migrations(&pool).await?;

    Ok(DocumentStore::Postgres(pool))
}

pub fn build_router(store: DocumentStore) -> Router {
    documents::router(store)
}
