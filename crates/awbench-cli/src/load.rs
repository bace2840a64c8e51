//! Load command handlers. These are called from `main` after configuration
//! is established; each connects to its store, runs the full CSV load, and
//! prints a summary.

use std::path::Path;

use awbench_core::AppConfig;
use awbench_pg::PoolConfig;

/// COPY the CSV dataset into PostgreSQL.
///
/// When `ensure_schema` is set the tables and indexes are created first;
/// otherwise the schema is assumed to exist.
///
/// # Errors
///
/// Returns an error if the connection, schema creation, or any required
/// COPY fails. A missing product_metrics.csv is logged and skipped inside
/// the loader, not propagated.
pub(crate) async fn run_load_postgres(
    config: &AppConfig,
    data_dir: &Path,
    ensure_schema: bool,
) -> anyhow::Result<()> {
    let pool = awbench_pg::connect_pool(&config.postgres_url(), PoolConfig::from_app_config(config))
        .await?;
    awbench_pg::ping(&pool).await?;

    if ensure_schema {
        awbench_pg::ensure_schema(&pool).await?;
    }

    let stats = awbench_pg::run_full_load(&pool, data_dir).await?;
    println!(
        "loaded {} rows into PostgreSQL in {:.2}s",
        stats.total_rows(),
        stats.total_elapsed_secs
    );
    println!(
        "  products: {}  price_history: {}  sales_rank_history: {}  product_metrics: {}",
        stats.products_count,
        stats.price_history_count,
        stats.sales_rank_history_count,
        stats.product_metrics_count
    );
    let orphans = stats.integrity.total_orphans();
    if orphans > 0 {
        println!("  WARNING: {orphans} orphaned history rows (no matching product)");
    }

    match awbench_pg::storage_size_mb(&pool).await {
        Ok(mb) => println!("  database size: {mb:.1} MB"),
        Err(e) => tracing::warn!(error = %e, "could not measure database size"),
    }
    Ok(())
}

/// Build embedded-array product documents from the CSVs and insert them
/// into MongoDB.
///
/// # Errors
///
/// Returns an error if the connection fails or any of the three input
/// files is missing or malformed. Failed insert batches are logged and
/// skipped inside the loader.
pub(crate) async fn run_load_mongo(config: &AppConfig, data_dir: &Path) -> anyhow::Result<()> {
    let db = awbench_mongo::connect(&config.mongo).await?;
    awbench_mongo::ping(&db).await?;

    let mut loader =
        awbench_mongo::MongoLoader::new(&db, config.csv_chunk_size, config.insert_batch_size);
    let stats = loader.run_full_load(data_dir).await?;
    println!(
        "loaded {} product documents into MongoDB in {:.2}s",
        stats.products_inserted, stats.total_elapsed_secs
    );
    println!(
        "  embedded points: {} price / {} sales rank",
        stats.price_points, stats.rank_points
    );
    if stats.batches_failed > 0 {
        println!("  WARNING: {} insert batches failed and were skipped", stats.batches_failed);
    }
    let orphans = stats.orphan_price_asins + stats.orphan_rank_asins;
    if orphans > 0 {
        println!("  WARNING: {orphans} history ASINs had no matching product");
    }

    match awbench_mongo::storage_size_mb(&db).await {
        Ok(mb) => println!("  database size: {mb:.1} MB"),
        Err(e) => tracing::warn!(error = %e, "could not measure database size"),
    }
    Ok(())
}
