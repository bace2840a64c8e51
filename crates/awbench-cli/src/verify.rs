//! Connectivity and data sanity check across both stores.

use awbench_core::AppConfig;
use awbench_pg::PoolConfig;

/// Ping both stores and print row/document counts plus storage sizes.
/// A store that is unreachable is reported and skipped, not fatal, so one
/// side can be checked while the other is down.
///
/// # Errors
///
/// Returns an error only if neither store is reachable.
pub(crate) async fn run_verify(config: &AppConfig) -> anyhow::Result<()> {
    let pg_ok = verify_postgres(config).await;
    let mongo_ok = verify_mongo(config).await;

    if !pg_ok && !mongo_ok {
        anyhow::bail!("neither PostgreSQL nor MongoDB is reachable");
    }
    Ok(())
}

async fn verify_postgres(config: &AppConfig) -> bool {
    let pool = match awbench_pg::connect_pool(
        &config.postgres_url(),
        PoolConfig::from_app_config(config),
    )
    .await
    {
        Ok(pool) => pool,
        Err(e) => {
            println!("PostgreSQL: unreachable ({e})");
            return false;
        }
    };
    if let Err(e) = awbench_pg::ping(&pool).await {
        println!("PostgreSQL: unreachable ({e})");
        return false;
    }
    println!("PostgreSQL: ok");

    match awbench_pg::verify_integrity(&pool).await {
        Ok(report) => {
            println!(
                "  products: {}  price_history: {}  sales_rank_history: {}  product_metrics: {}",
                report.products_count,
                report.price_history_count,
                report.sales_rank_history_count,
                report.product_metrics_count
            );
            let orphans = report.total_orphans();
            if orphans > 0 {
                println!("  WARNING: {orphans} orphaned rows");
            }
            println!(
                "  price points per product: {:.1} avg / {} max",
                report.avg_price_records_per_product, report.max_price_records_per_product
            );
        }
        Err(e) => tracing::warn!(error = %e, "integrity check failed"),
    }
    match awbench_pg::storage_size_mb(&pool).await {
        Ok(mb) => println!("  database size: {mb:.1} MB"),
        Err(e) => tracing::warn!(error = %e, "could not measure database size"),
    }
    true
}

async fn verify_mongo(config: &AppConfig) -> bool {
    let db = match awbench_mongo::connect(&config.mongo).await {
        Ok(db) => db,
        Err(e) => {
            println!("MongoDB: unreachable ({e})");
            return false;
        }
    };
    if let Err(e) = awbench_mongo::ping(&db).await {
        println!("MongoDB: unreachable ({e})");
        return false;
    }
    println!("MongoDB: ok");

    match awbench_mongo::count_products(&db).await {
        Ok(count) => println!("  products: {count}"),
        Err(e) => tracing::warn!(error = %e, "could not count documents"),
    }
    match awbench_mongo::storage_size_mb(&db).await {
        Ok(mb) => println!("  database size: {mb:.1} MB"),
        Err(e) => tracing::warn!(error = %e, "could not measure database size"),
    }
    true
}
