//! The SQL side of the analytical query pairs.
//!
//! Each query here has an aggregation-pipeline twin in `awbench-mongo`; the
//! two must stay row-equivalent or the latency comparison stops measuring
//! the same work. Date windows are bound through `make_interval` so both
//! stores see the same trailing window.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::PgError;

/// One month/category group from the price-trend query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceTrendRow {
    pub category: Option<String>,
    pub month: NaiveDate,
    pub product_count: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub price_stddev: Option<f64>,
}

/// One observation from the sales-rank improvement leaderboard.
///
/// `rank_change` is negative: a lower rank number is better, and the query
/// filters to improvements only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankImprovementRow {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub date: NaiveDate,
    pub sales_rank: f64,
    pub previous_rank: f64,
    pub rank_change: f64,
}

/// One brand/product group from the brand-analysis query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandAnalysisRow {
    pub brand: String,
    pub asin: String,
    pub title: Option<String>,
    pub avg_rating: Option<f64>,
    pub avg_review_count: Option<f64>,
    pub max_review_count: Option<i64>,
    pub metric_count: i64,
}

/// One brand from the leaderboard variant, with rank and price signals
/// joined in from `product_metrics`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandLeaderboardRow {
    pub brand: String,
    pub product_count: i64,
    pub avg_rating: Option<f64>,
    pub avg_sales_rank: Option<f64>,
    pub avg_price: Option<f64>,
    pub total_reviews: Option<i64>,
}

const PRICE_TREND_SQL: &str = "SELECT \
         source_category AS category, \
         (DATE_TRUNC('month', date))::date AS month, \
         COUNT(DISTINCT asin) AS product_count, \
         AVG(price_usd)::float8 AS avg_price, \
         MIN(price_usd)::float8 AS min_price, \
         MAX(price_usd)::float8 AS max_price, \
         STDDEV(price_usd)::float8 AS price_stddev \
     FROM price_history \
     WHERE date >= CURRENT_DATE - make_interval(months => $1) \
       AND ($2::text IS NULL OR source_category = $2) \
     GROUP BY source_category, DATE_TRUNC('month', date) \
     ORDER BY month DESC, category";

const RANK_IMPROVEMENT_SQL: &str = "WITH rank_changes AS ( \
         SELECT \
             srh.asin, \
             p.title, \
             p.brand, \
             p.source_category AS category, \
             srh.date, \
             srh.sales_rank, \
             LAG(srh.sales_rank) OVER (PARTITION BY srh.asin ORDER BY srh.date) \
                 AS previous_rank, \
             srh.sales_rank - LAG(srh.sales_rank) \
                 OVER (PARTITION BY srh.asin ORDER BY srh.date) AS rank_change \
         FROM sales_rank_history srh \
         JOIN products p ON srh.asin = p.asin \
         WHERE srh.date >= CURRENT_DATE - make_interval(days => $1) \
           AND srh.sales_rank IS NOT NULL \
     ) \
     SELECT \
         asin, title, brand, category, date, \
         sales_rank::float8 AS sales_rank, \
         previous_rank::float8 AS previous_rank, \
         rank_change::float8 AS rank_change \
     FROM rank_changes \
     WHERE rank_change IS NOT NULL \
       AND rank_change < 0 \
     ORDER BY rank_change ASC \
     LIMIT $2";

const BRAND_ANALYSIS_SQL: &str = "SELECT \
         p.brand, \
         p.asin, \
         p.title, \
         AVG(p.rating)::float8 AS avg_rating, \
         AVG(p.review_count)::float8 AS avg_review_count, \
         MAX(p.review_count)::bigint AS max_review_count, \
         COUNT(*) AS metric_count \
     FROM products p \
     WHERE p.brand IS NOT NULL \
       AND ($1::text IS NULL OR p.brand = $1) \
     GROUP BY p.brand, p.asin, p.title \
     ORDER BY p.brand, avg_rating DESC, avg_review_count DESC";

const BRAND_LEADERBOARD_SQL: &str = "SELECT \
         p.brand, \
         COUNT(DISTINCT p.asin) AS product_count, \
         AVG(p.rating)::float8 AS avg_rating, \
         AVG(pm.current_sales_rank)::float8 AS avg_sales_rank, \
         AVG(pm.current_price)::float8 AS avg_price, \
         SUM(p.review_count)::bigint AS total_reviews \
     FROM products p \
     LEFT JOIN product_metrics pm ON pm.asin = p.asin \
     WHERE p.brand IS NOT NULL \
     GROUP BY p.brand \
     HAVING COUNT(DISTINCT p.asin) >= $1 \
     ORDER BY avg_sales_rank ASC NULLS LAST \
     LIMIT $2";

/// Monthly price statistics per category over a trailing window.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the query fails.
pub async fn price_trend_by_category(
    pool: &PgPool,
    category: Option<&str>,
    months: i32,
) -> Result<Vec<PriceTrendRow>, PgError> {
    let rows = sqlx::query_as::<_, PriceTrendRow>(PRICE_TREND_SQL)
        .bind(months)
        .bind(category)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Products with the largest sales-rank improvement over a trailing window.
///
/// Uses a windowed `LAG` over successive observations per product; only
/// negative deltas (improvements) survive, most-improved first.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the query fails.
pub async fn rank_improvement_leaderboard(
    pool: &PgPool,
    days: i32,
    limit: i64,
) -> Result<Vec<RankImprovementRow>, PgError> {
    let rows = sqlx::query_as::<_, RankImprovementRow>(RANK_IMPROVEMENT_SQL)
        .bind(days)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Rating and review-count aggregates per brand/product.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the query fails.
pub async fn brand_analysis(
    pool: &PgPool,
    brand: Option<&str>,
) -> Result<Vec<BrandAnalysisRow>, PgError> {
    let rows = sqlx::query_as::<_, BrandAnalysisRow>(BRAND_ANALYSIS_SQL)
        .bind(brand)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Brand leaderboard joining in rank and price signals, restricted to
/// brands with at least `min_products` distinct products.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if the query fails.
pub async fn brand_leaderboard(
    pool: &PgPool,
    min_products: i64,
    limit: i64,
) -> Result<Vec<BrandLeaderboardRow>, PgError> {
    let rows = sqlx::query_as::<_, BrandLeaderboardRow>(BRAND_LEADERBOARD_SQL)
        .bind(min_products)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
