//! Offline unit tests for awbench-pg pool configuration and row types.
//! These tests do not require a live database connection.

use awbench_pg::{IntegrityReport, LoadStats, PoolConfig, PriceTrendRow, RankImprovementRow};
use chrono::NaiveDate;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let mut cfg = awbench_core::load_app_config_from_env().unwrap();
    cfg.db_max_connections = 42;
    cfg.db_min_connections = 7;
    cfg.db_acquire_timeout_secs = 9;

    let pool_config = PoolConfig::from_app_config(&cfg);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm the query row types carry the fields
/// the comparison harness relies on. No database required.
#[test]
fn price_trend_row_has_expected_fields() {
    let row = PriceTrendRow {
        category: Some("Electronics".to_string()),
        month: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        product_count: 12,
        avg_price: Some(19.99),
        min_price: Some(9.99),
        max_price: Some(29.99),
        price_stddev: Some(4.2),
    };
    assert_eq!(row.product_count, 12);
    assert_eq!(row.month.format("%Y-%m-%d").to_string(), "2024-03-01");
}

#[test]
fn rank_improvement_row_holds_negative_changes() {
    let row = RankImprovementRow {
        asin: "B08N5WRWNW".to_string(),
        title: Some("Widget".to_string()),
        brand: Some("Acme".to_string()),
        category: Some("Tools".to_string()),
        date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        sales_rank: 90.0,
        previous_rank: 140.0,
        rank_change: -50.0,
    };
    assert!(row.rank_change < 0.0);
    assert_eq!(row.sales_rank - row.previous_rank, row.rank_change);
}

#[test]
fn load_stats_serialize_for_the_report_file() {
    let stats = LoadStats {
        products_count: 3,
        price_history_count: 9,
        sales_rank_history_count: 9,
        product_metrics_count: 0,
        total_elapsed_secs: 0.25,
        integrity: IntegrityReport::default(),
    };
    assert_eq!(stats.total_rows(), 21);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["products_count"], 3);
    assert_eq!(json["integrity"]["orphaned_price_history"], 0);
}
