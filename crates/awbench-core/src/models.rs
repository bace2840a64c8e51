//! CSV record types shared by both loaders.
//!
//! Field names match the CSV headers exactly, so `csv`'s serde integration
//! can deserialize rows without rename attributes. Numeric fields are
//! optional because the source export leaves them blank for products with no
//! observed value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of `products.csv`.
///
/// `review_count` arrives as a float (e.g. `"152.0"`) even though it is
/// integer-typed in the relational schema; the Postgres loader rewrites it
/// during preprocessing and the document loader keeps the float as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub source_category: Option<String>,
    pub current_price: Option<f64>,
    pub current_sales_rank: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<f64>,
}

/// One row of `price_history.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePointRecord {
    pub asin: String,
    pub date: NaiveDate,
    pub price_usd: Option<f64>,
    pub source_category: Option<String>,
    pub brand: Option<String>,
    pub price_bucket: Option<String>,
}

/// One row of `sales_rank_history.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankPointRecord {
    pub asin: String,
    pub date: NaiveDate,
    pub sales_rank: Option<f64>,
    pub source_category: Option<String>,
    pub brand: Option<String>,
    pub rank_bucket: Option<String>,
}

/// One row of `product_metrics.csv` (optional input; relational-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub asin: String,
    pub source_category: Option<String>,
    pub brand: Option<String>,
    pub current_price: Option<f64>,
    pub current_rating: Option<f64>,
    pub review_count: Option<f64>,
    pub current_sales_rank: Option<f64>,
    pub monthly_sold: Option<f64>,
}
