//! Relational schema bootstrap.
//!
//! The benchmark assumes the four warehouse tables exist; `ensure_schema`
//! creates them (plus foreign keys and the indexes the analytical queries
//! lean on) so a fresh database can be benchmarked end to end. Every
//! statement is `IF NOT EXISTS`, so re-running against a populated database
//! is a no-op.

use sqlx::PgPool;

use crate::PgError;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS products ( \
         asin TEXT PRIMARY KEY, \
         title TEXT, \
         brand TEXT, \
         source_category TEXT, \
         current_price DOUBLE PRECISION, \
         current_sales_rank DOUBLE PRECISION, \
         rating DOUBLE PRECISION, \
         review_count INTEGER \
     )",
    "CREATE TABLE IF NOT EXISTS price_history ( \
         id BIGSERIAL PRIMARY KEY, \
         asin TEXT NOT NULL REFERENCES products(asin), \
         date DATE NOT NULL, \
         price_usd DOUBLE PRECISION, \
         source_category TEXT, \
         brand TEXT, \
         price_bucket TEXT \
     )",
    "CREATE TABLE IF NOT EXISTS sales_rank_history ( \
         id BIGSERIAL PRIMARY KEY, \
         asin TEXT NOT NULL REFERENCES products(asin), \
         date DATE NOT NULL, \
         sales_rank DOUBLE PRECISION, \
         source_category TEXT, \
         brand TEXT, \
         rank_bucket TEXT \
     )",
    // review_count stays DOUBLE PRECISION here: the metrics CSV is copied in
    // raw, without the float-to-int preprocessing the products file gets.
    "CREATE TABLE IF NOT EXISTS product_metrics ( \
         id BIGSERIAL PRIMARY KEY, \
         asin TEXT NOT NULL REFERENCES products(asin), \
         source_category TEXT, \
         brand TEXT, \
         current_price DOUBLE PRECISION, \
         current_rating DOUBLE PRECISION, \
         review_count DOUBLE PRECISION, \
         current_sales_rank DOUBLE PRECISION, \
         monthly_sold DOUBLE PRECISION \
     )",
    "CREATE INDEX IF NOT EXISTS idx_price_history_asin ON price_history (asin)",
    "CREATE INDEX IF NOT EXISTS idx_price_history_date ON price_history (date)",
    "CREATE INDEX IF NOT EXISTS idx_sales_rank_history_asin ON sales_rank_history (asin)",
    "CREATE INDEX IF NOT EXISTS idx_sales_rank_history_date ON sales_rank_history (date)",
    "CREATE INDEX IF NOT EXISTS idx_products_brand ON products (brand)",
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products (source_category)",
];

/// Create the warehouse tables and indexes if they do not exist.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), PgError> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(
        statements = SCHEMA_STATEMENTS.len(),
        "relational schema ensured"
    );
    Ok(())
}

/// Empty all four tables so a fresh load starts from scratch. The cascade
/// clears the history and metrics tables through their foreign keys.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the truncate fails.
pub async fn truncate_all(pool: &PgPool) -> Result<(), PgError> {
    sqlx::query("TRUNCATE products CASCADE").execute(pool).await?;
    tracing::info!("truncated warehouse tables");
    Ok(())
}
