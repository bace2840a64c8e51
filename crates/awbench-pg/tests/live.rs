//! Live integration tests against a real Postgres instance.
//!
//! Gated behind `AWBENCH_LIVE_DATABASE_URL`: when the variable is unset the
//! tests return early so the suite stays green in offline CI. Point it at a
//! disposable database; the tests create the schema and truncate the
//! warehouse tables at the start of each run.

use std::io::Write;
use std::path::Path;

use awbench_pg::{ensure_schema, run_full_load, storage_size_mb, PoolConfig};
use sqlx::PgPool;

async fn live_pool() -> Option<PgPool> {
    let url = std::env::var("AWBENCH_LIVE_DATABASE_URL").ok()?;
    let pool = awbench_pg::connect_pool(&url, PoolConfig::default())
        .await
        .expect("live database must be reachable when AWBENCH_LIVE_DATABASE_URL is set");
    Some(pool)
}

async fn reset_tables(pool: &PgPool) {
    ensure_schema(pool).await.expect("ensure_schema");
    for table in [
        "product_metrics",
        "price_history",
        "sales_rank_history",
        "products",
    ] {
        sqlx::query(&format!("TRUNCATE {table} CASCADE"))
            .execute(pool)
            .await
            .expect("truncate");
    }
}

fn write_fixture_csvs(dir: &Path) {
    let mut products = std::fs::File::create(dir.join("products.csv")).unwrap();
    writeln!(
        products,
        "asin,title,brand,source_category,current_price,current_sales_rank,rating,review_count"
    )
    .unwrap();
    writeln!(products, "B000000001,Widget,Acme,Tools,9.99,120.0,4.5,152.0").unwrap();
    writeln!(products, "B000000002,Gadget,Acme,Tools,19.99,88.0,4.0,23.0").unwrap();
    writeln!(products, "B000000003,Gizmo,Bolt,Toys,5.49,300.0,3.5,7.0").unwrap();

    let mut prices = std::fs::File::create(dir.join("price_history.csv")).unwrap();
    writeln!(prices, "asin,date,price_usd,source_category,brand,price_bucket").unwrap();
    for (asin, date, price) in [
        ("B000000001", "2024-01-05", "9.99"),
        ("B000000001", "2024-02-05", "8.99"),
        ("B000000002", "2024-01-05", "19.99"),
        ("B000000003", "2024-02-05", "5.49"),
    ] {
        writeln!(prices, "{asin},{date},{price},Tools,Acme,0-10").unwrap();
    }

    let mut ranks = std::fs::File::create(dir.join("sales_rank_history.csv")).unwrap();
    writeln!(ranks, "asin,date,sales_rank,source_category,brand,rank_bucket").unwrap();
    for (asin, date, rank) in [
        ("B000000001", "2024-01-05", "140.0"),
        ("B000000001", "2024-02-05", "90.0"),
        ("B000000002", "2024-01-05", "88.0"),
        ("B000000003", "2024-02-05", "310.0"),
    ] {
        writeln!(ranks, "{asin},{date},{rank},Tools,Acme,top-500").unwrap();
    }
    // No product_metrics.csv: the optional file path must be a logged skip.
}

#[tokio::test]
async fn full_load_has_zero_orphans_on_well_formed_input() {
    let Some(pool) = live_pool().await else {
        eprintln!("AWBENCH_LIVE_DATABASE_URL not set; skipping live test");
        return;
    };
    reset_tables(&pool).await;

    let dir = tempfile::tempdir().unwrap();
    write_fixture_csvs(dir.path());

    let stats = run_full_load(&pool, dir.path()).await.expect("full load");
    assert_eq!(stats.products_count, 3);
    assert_eq!(stats.price_history_count, 4);
    assert_eq!(stats.sales_rank_history_count, 4);
    assert_eq!(stats.product_metrics_count, 0);
    assert_eq!(stats.integrity.total_orphans(), 0);
    assert_eq!(stats.integrity.products_count, 3);
}

#[tokio::test]
async fn double_load_violates_unique_asin_constraint() {
    let Some(pool) = live_pool().await else {
        eprintln!("AWBENCH_LIVE_DATABASE_URL not set; skipping live test");
        return;
    };
    reset_tables(&pool).await;

    let dir = tempfile::tempdir().unwrap();
    write_fixture_csvs(dir.path());

    let products = dir.path().join("products.csv");
    awbench_pg::load_products(&pool, &products)
        .await
        .expect("first load");
    let second = awbench_pg::load_products(&pool, &products).await;
    assert!(second.is_err(), "duplicate ASINs must violate the PK");
}

#[tokio::test]
async fn analytical_queries_return_grouped_rows() {
    let Some(pool) = live_pool().await else {
        eprintln!("AWBENCH_LIVE_DATABASE_URL not set; skipping live test");
        return;
    };
    reset_tables(&pool).await;

    let dir = tempfile::tempdir().unwrap();
    write_fixture_csvs(dir.path());
    run_full_load(&pool, dir.path()).await.expect("full load");

    // One category over a 12-month window can yield at most 12 groups.
    let trend = awbench_pg::price_trend_by_category(&pool, Some("Tools"), 12_000)
        .await
        .expect("price trend");
    let tools_months: Vec<_> = trend
        .iter()
        .filter(|r| r.category.as_deref() == Some("Tools"))
        .collect();
    assert!(tools_months.len() <= 12_000);
    for row in &trend {
        assert!(row.product_count >= 1);
    }

    let improvements = awbench_pg::rank_improvement_leaderboard(&pool, 36_500, 10)
        .await
        .expect("rank improvements");
    assert_eq!(improvements.len(), 1, "only B000000001 improved");
    assert_eq!(improvements[0].asin, "B000000001");
    assert!(improvements[0].rank_change < 0.0);

    let brands = awbench_pg::brand_analysis(&pool, None).await.expect("brand analysis");
    assert_eq!(brands.len(), 3);

    let size = storage_size_mb(&pool).await.expect("storage size");
    assert!(size >= 0.0);
}
