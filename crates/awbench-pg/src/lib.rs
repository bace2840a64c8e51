use std::path::PathBuf;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &awbench_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum PgError {
    #[error("required input file not found: {0}")]
    MissingInput(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Total on-disk size of the current database in megabytes.
///
/// An empty database reports its (small, non-negative) catalog footprint
/// rather than failing.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the size query fails.
#[allow(clippy::cast_precision_loss)]
pub async fn storage_size_mb(pool: &PgPool) -> Result<f64, PgError> {
    let bytes: i64 =
        sqlx::query_scalar("SELECT pg_database_size(current_database())::bigint")
            .fetch_one(pool)
            .await?;
    Ok((bytes.max(0) as f64) / (1024.0 * 1024.0))
}

pub mod loader;
pub mod queries;
pub mod schema;

pub use loader::{
    load_price_history, load_product_metrics, load_products, load_sales_rank_history,
    run_full_load, verify_integrity, IntegrityReport, LoadStats,
};
pub use queries::{
    brand_analysis, brand_leaderboard, price_trend_by_category, rank_improvement_leaderboard,
    BrandAnalysisRow, BrandLeaderboardRow, PriceTrendRow, RankImprovementRow,
};
pub use schema::{ensure_schema, truncate_all};
