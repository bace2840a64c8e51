//! The head-to-head benchmark: fresh loads on both stores, timed query
//! pairs, storage measurement, then the JSON report and comparison chart.
//!
//! Connection failures are fatal. Everything after that is a measurement:
//! a query that errors is recorded as failed on that backend and the run
//! continues.

use std::future::Future;
use std::path::Path;
use std::time::Instant;

use awbench_core::AppConfig;
use awbench_pg::PoolConfig;
use awbench_report::{
    render_comparison_chart, Backend, BenchmarkReport, LoadComparison, QueryComparison,
    QueryTiming, StorageComparison,
};
use chrono::Utc;

const PRICE_TREND_MONTHS: i32 = 12;
const RANK_WINDOW_DAYS: i32 = 30;
const RANK_LIMIT: i64 = 10;
const LEADERBOARD_MIN_PRODUCTS: i64 = 5;
const LEADERBOARD_LIMIT: i64 = 10;

async fn measure<T, E: std::fmt::Display>(
    timing: &mut QueryTiming,
    rows: &mut Option<u64>,
    backend: Backend,
    query: &str,
    fut: impl Future<Output = Result<Vec<T>, E>>,
) {
    let started = Instant::now();
    match fut.await {
        Ok(result) => {
            timing.record_success(started.elapsed());
            rows.get_or_insert(result.len() as u64);
        }
        Err(e) => {
            timing.record_failure();
            tracing::warn!(backend = %backend, query, error = %e, "query iteration failed");
        }
    }
}

/// Runs the full benchmark and writes `out_json` and `out_chart`.
///
/// # Errors
///
/// Returns an error if either store is unreachable, a bulk load fails, or
/// a report artifact cannot be written. Query and storage measurement
/// failures are recorded in the report instead of propagated.
pub(crate) async fn run_bench(
    config: &AppConfig,
    iterations: u32,
    skip_load: bool,
    out_json: &Path,
    out_chart: &Path,
) -> anyhow::Result<()> {
    let pool = awbench_pg::connect_pool(&config.postgres_url(), PoolConfig::from_app_config(config))
        .await?;
    awbench_pg::ping(&pool).await?;
    let db = awbench_mongo::connect(&config.mongo).await?;
    awbench_mongo::ping(&db).await?;

    let mut load = LoadComparison::default();
    if skip_load {
        tracing::info!("skipping bulk loads, benchmarking existing data");
    } else {
        awbench_pg::ensure_schema(&pool).await?;
        awbench_pg::truncate_all(&pool).await?;
        let pg_stats = awbench_pg::run_full_load(&pool, &config.data_dir).await?;
        load.postgres_secs = pg_stats.total_elapsed_secs;

        awbench_mongo::drop_products(&db).await?;
        let mut loader =
            awbench_mongo::MongoLoader::new(&db, config.csv_chunk_size, config.insert_batch_size);
        let mongo_stats = loader.run_full_load(&config.data_dir).await?;
        load.mongo_secs = mongo_stats.total_elapsed_secs;
    }

    let collection = db.collection(awbench_mongo::PRODUCTS_COLLECTION);

    let mut price_trend = QueryComparison::new("price_trend");
    let mut rank_improvement = QueryComparison::new("sales_rank_improvement");
    let mut brand_analysis = QueryComparison::new("brand_analysis");
    let mut brand_leaderboard = QueryComparison::new("brand_leaderboard");

    for i in 0..iterations {
        tracing::info!(iteration = i + 1, total = iterations, "benchmark iteration");

        measure(
            &mut price_trend.postgres,
            &mut price_trend.postgres_rows,
            Backend::Postgres,
            "price_trend",
            awbench_pg::price_trend_by_category(&pool, None, PRICE_TREND_MONTHS),
        )
        .await;
        measure(
            &mut price_trend.mongo,
            &mut price_trend.mongo_rows,
            Backend::Mongo,
            "price_trend",
            awbench_mongo::price_trend_by_category(
                &collection,
                Utc::now(),
                i64::from(PRICE_TREND_MONTHS),
                None,
            ),
        )
        .await;

        measure(
            &mut rank_improvement.postgres,
            &mut rank_improvement.postgres_rows,
            Backend::Postgres,
            "sales_rank_improvement",
            awbench_pg::rank_improvement_leaderboard(&pool, RANK_WINDOW_DAYS, RANK_LIMIT),
        )
        .await;
        measure(
            &mut rank_improvement.mongo,
            &mut rank_improvement.mongo_rows,
            Backend::Mongo,
            "sales_rank_improvement",
            awbench_mongo::rank_improvement_leaderboard(
                &collection,
                Utc::now(),
                i64::from(RANK_WINDOW_DAYS),
                RANK_LIMIT,
            ),
        )
        .await;

        measure(
            &mut brand_analysis.postgres,
            &mut brand_analysis.postgres_rows,
            Backend::Postgres,
            "brand_analysis",
            awbench_pg::brand_analysis(&pool, None),
        )
        .await;
        measure(
            &mut brand_analysis.mongo,
            &mut brand_analysis.mongo_rows,
            Backend::Mongo,
            "brand_analysis",
            awbench_mongo::brand_analysis(&collection, None),
        )
        .await;

        measure(
            &mut brand_leaderboard.postgres,
            &mut brand_leaderboard.postgres_rows,
            Backend::Postgres,
            "brand_leaderboard",
            awbench_pg::brand_leaderboard(&pool, LEADERBOARD_MIN_PRODUCTS, LEADERBOARD_LIMIT),
        )
        .await;
        measure(
            &mut brand_leaderboard.mongo,
            &mut brand_leaderboard.mongo_rows,
            Backend::Mongo,
            "brand_leaderboard",
            awbench_mongo::brand_leaderboard(
                &collection,
                LEADERBOARD_MIN_PRODUCTS,
                LEADERBOARD_LIMIT,
            ),
        )
        .await;
    }

    let mut storage = StorageComparison::default();
    match awbench_pg::storage_size_mb(&pool).await {
        Ok(mb) => storage.postgres_mb = mb,
        Err(e) => tracing::warn!(error = %e, "could not measure PostgreSQL storage"),
    }
    match awbench_mongo::storage_size_mb(&db).await {
        Ok(mb) => storage.mongo_mb = mb,
        Err(e) => tracing::warn!(error = %e, "could not measure MongoDB storage"),
    }

    let comparisons = [price_trend, rank_improvement, brand_analysis, brand_leaderboard];
    for cmp in &comparisons {
        if cmp.row_counts_diverge() {
            tracing::warn!(
                query = %cmp.name,
                postgres_rows = cmp.postgres_rows,
                mongo_rows = cmp.mongo_rows,
                "row counts differ between stores, comparison may not be like for like"
            );
        }
    }
    let report = BenchmarkReport::new(iterations, load, storage, &comparisons);
    report.save_json(out_json)?;
    render_comparison_chart(out_chart, &load, &comparisons)?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &BenchmarkReport) {
    println!("benchmark complete ({} iterations per query)", report.iterations);
    if report.load.postgres_secs > 0.0 || report.load.mongo_secs > 0.0 {
        println!(
            "  load: PostgreSQL {:.2}s vs MongoDB {:.2}s ({} faster)",
            report.load.postgres_secs,
            report.load.mongo_secs,
            report.load.faster()
        );
    }
    println!(
        "  storage: PostgreSQL {:.1} MB vs MongoDB {:.1} MB",
        report.storage.postgres_mb, report.storage.mongo_mb
    );
    for query in &report.queries {
        let pg = query
            .postgres_mean_ms
            .map_or_else(|| "failed".to_string(), |ms| format!("{ms:.1}ms"));
        let mongo = query
            .mongo_mean_ms
            .map_or_else(|| "failed".to_string(), |ms| format!("{ms:.1}ms"));
        match (query.winner, query.speedup) {
            (Some(winner), Some(speedup)) => {
                println!("  {}: {pg} vs {mongo} ({winner} {speedup:.1}x faster)", query.name);
            }
            (Some(winner), None) => {
                println!("  {}: {pg} vs {mongo} ({winner} wins by default)", query.name);
            }
            (None, _) => println!("  {}: {pg} vs {mongo} (no winner)", query.name),
        }
    }
}
