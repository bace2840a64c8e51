use std::path::PathBuf;

use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use thiserror::Error;

/// Name of the single collection holding product documents with embedded
/// history arrays.
pub const PRODUCTS_COLLECTION: &str = "products";

#[derive(Debug, Error)]
pub enum MongoError {
    #[error("required input file not found: {0}")]
    MissingInput(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
    #[error(transparent)]
    Bson(#[from] mongodb::bson::de::Error),
}

/// Connect to the document store and return a handle on the configured
/// database.
///
/// # Errors
///
/// Returns [`MongoError::Driver`] if the URI is invalid or the client
/// cannot be built.
pub async fn connect(config: &awbench_core::MongoConfig) -> Result<Database, MongoError> {
    let client = Client::with_uri_str(config.uri()).await?;
    Ok(client.database(&config.database))
}

/// Round-trip a `ping` command to verify the server is reachable.
///
/// # Errors
///
/// Returns [`MongoError::Driver`] if the command fails.
pub async fn ping(db: &Database) -> Result<(), MongoError> {
    db.run_command(doc! { "ping": 1 }).await?;
    Ok(())
}

/// Data plus index size of the database in megabytes, via `dbStats`.
///
/// An empty or never-written database reports `0`, not an error.
///
/// # Errors
///
/// Returns [`MongoError::Driver`] if the `dbStats` command fails.
pub async fn storage_size_mb(db: &Database) -> Result<f64, MongoError> {
    let stats = db.run_command(doc! { "dbStats": 1 }).await?;
    let bytes = numeric_field(&stats, "dataSize") + numeric_field(&stats, "indexSize");
    Ok((bytes / (1024.0 * 1024.0)).max(0.0))
}

/// Reads a numeric field from a command reply, tolerating the int32 /
/// int64 / double encodings different server versions emit.
#[allow(clippy::cast_precision_loss)]
fn numeric_field(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

/// Number of product documents currently stored.
///
/// # Errors
///
/// Returns [`MongoError::Driver`] if the count fails.
pub async fn count_products(db: &Database) -> Result<u64, MongoError> {
    let collection = db.collection::<Document>(PRODUCTS_COLLECTION);
    Ok(collection.count_documents(doc! {}).await?)
}

/// Drop the products collection so a fresh load starts from scratch.
/// Dropping a collection that does not exist is a no-op on the server.
///
/// # Errors
///
/// Returns [`MongoError::Driver`] if the drop fails.
pub async fn drop_products(db: &Database) -> Result<(), MongoError> {
    db.collection::<Document>(PRODUCTS_COLLECTION).drop().await?;
    tracing::info!(collection = PRODUCTS_COLLECTION, "dropped collection");
    Ok(())
}

pub mod loader;
pub mod queries;

pub use loader::{MongoLoadStats, MongoLoader};
pub use queries::{
    brand_analysis, brand_analysis_pipeline, brand_leaderboard, brand_leaderboard_pipeline,
    price_trend_by_category, price_trend_pipeline, rank_improvement_leaderboard,
    rank_improvement_pipeline, BrandAnalysisDoc, BrandLeaderboardDoc, PriceTrendDoc,
    RankImprovementDoc,
};
