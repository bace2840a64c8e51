//! COPY-based bulk loaders for the relational store.
//!
//! Load order is fixed: products first (the history tables reference it by
//! foreign key), then price history, sales-rank history, and finally product
//! metrics. Every table is fed through `COPY ... FROM STDIN` with an
//! explicit column list and CSV dialect, bypassing row-by-row inserts.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::PgPool;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::PgError;

const COPY_PRODUCTS: &str = "COPY products ( \
         asin, title, brand, source_category, \
         current_price, current_sales_rank, rating, review_count \
     ) FROM STDIN WITH (FORMAT csv, DELIMITER ',', QUOTE '\"', ESCAPE '\"')";

const COPY_PRICE_HISTORY: &str = "COPY price_history ( \
         asin, date, price_usd, source_category, brand, price_bucket \
     ) FROM STDIN WITH (FORMAT csv, DELIMITER ',', QUOTE '\"', ESCAPE '\"')";

const COPY_SALES_RANK_HISTORY: &str = "COPY sales_rank_history ( \
         asin, date, sales_rank, source_category, brand, rank_bucket \
     ) FROM STDIN WITH (FORMAT csv, DELIMITER ',', QUOTE '\"', ESCAPE '\"')";

const COPY_PRODUCT_METRICS: &str = "COPY product_metrics ( \
         asin, source_category, brand, current_price, \
         current_rating, review_count, current_sales_rank, monthly_sold \
     ) FROM STDIN WITH (FORMAT csv, DELIMITER ',', QUOTE '\"', ESCAPE '\"')";

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Result of a full relational load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadStats {
    pub products_count: u64,
    pub price_history_count: u64,
    pub sales_rank_history_count: u64,
    pub product_metrics_count: u64,
    pub total_elapsed_secs: f64,
    pub integrity: IntegrityReport,
}

impl LoadStats {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.products_count
            + self.price_history_count
            + self.sales_rank_history_count
            + self.product_metrics_count
    }
}

/// Post-load row counts and referential-integrity statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub products_count: i64,
    pub price_history_count: i64,
    pub sales_rank_history_count: i64,
    pub product_metrics_count: i64,
    pub orphaned_price_history: i64,
    pub orphaned_sales_rank_history: i64,
    pub orphaned_product_metrics: i64,
    pub avg_price_records_per_product: f64,
    pub max_price_records_per_product: i64,
    pub avg_rank_records_per_product: f64,
    pub max_rank_records_per_product: i64,
}

impl IntegrityReport {
    /// Total number of history/metrics rows whose ASIN has no matching
    /// product. Zero under well-formed input.
    #[must_use]
    pub fn total_orphans(&self) -> i64 {
        self.orphaned_price_history
            + self.orphaned_sales_rank_history
            + self.orphaned_product_metrics
    }
}

/// Rewrites the products CSV so that `review_count` floats become integers.
///
/// The target column is `INTEGER`; the export writes values like `"152.0"`,
/// which COPY rejects. Blank or unparsable values become `0`. The header row
/// is carried through; the COPY path skips it. Returns the number of data
/// rows written.
///
/// # Errors
///
/// Returns [`PgError::Csv`] or [`PgError::Io`] if reading or writing fails.
pub fn preprocess_products_csv(src: &Path, dst: &Path) -> Result<u64, PgError> {
    let mut reader = csv::Reader::from_path(src)?;
    let headers = reader.headers()?.clone();
    let review_idx = headers.iter().position(|h| h == "review_count");

    let mut writer = csv::Writer::from_path(dst)?;
    writer.write_record(&headers)?;

    let mut rows: u64 = 0;
    for record in reader.records() {
        let record = record?;
        if let Some(idx) = review_idx {
            let mut out = csv::StringRecord::new();
            for (i, field) in record.iter().enumerate() {
                if i == idx {
                    #[allow(clippy::cast_possible_truncation)]
                    let as_int = field.trim().parse::<f64>().map(|v| v as i64).unwrap_or(0);
                    out.push_field(&as_int.to_string());
                } else {
                    out.push_field(field);
                }
            }
            writer.write_record(&out)?;
        } else {
            writer.write_record(&record)?;
        }
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

/// Streams a CSV file (header skipped) into a `COPY ... FROM STDIN`.
async fn copy_csv_file(pool: &PgPool, statement: &str, path: &Path) -> Result<u64, PgError> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);

    // The COPY statement names the columns itself; drop the CSV header line.
    let mut header = String::new();
    reader.read_line(&mut header).await?;

    let mut copy = pool.copy_in_raw(statement).await?;
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        copy.send(&buf[..n]).await?;
    }
    let rows = copy.finish().await?;
    Ok(rows)
}

/// Bulk-loads `products.csv`, preprocessing review counts first.
///
/// # Errors
///
/// Returns [`PgError::MissingInput`] if the file does not exist, or an I/O,
/// CSV, or database error from the preprocessing and COPY passes.
pub async fn load_products(pool: &PgPool, path: &Path) -> Result<u64, PgError> {
    if !path.exists() {
        return Err(PgError::MissingInput(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), "loading products");
    let started = Instant::now();

    tracing::info!("preprocessing products CSV (converting review_count to integer)");
    let tmp = tempfile::Builder::new().suffix(".csv").tempfile()?;
    preprocess_products_csv(path, tmp.path())?;

    let rows = copy_csv_file(pool, COPY_PRODUCTS, tmp.path()).await?;
    log_load("products", rows, started.elapsed().as_secs_f64());
    Ok(rows)
}

/// Bulk-loads `price_history.csv`.
///
/// # Errors
///
/// Returns [`PgError::MissingInput`] if the file does not exist, or an I/O
/// or database error from the COPY pass.
pub async fn load_price_history(pool: &PgPool, path: &Path) -> Result<u64, PgError> {
    if !path.exists() {
        return Err(PgError::MissingInput(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), "loading price history");
    let started = Instant::now();
    let rows = copy_csv_file(pool, COPY_PRICE_HISTORY, path).await?;
    log_load("price history", rows, started.elapsed().as_secs_f64());
    Ok(rows)
}

/// Bulk-loads `sales_rank_history.csv`.
///
/// # Errors
///
/// Returns [`PgError::MissingInput`] if the file does not exist, or an I/O
/// or database error from the COPY pass.
pub async fn load_sales_rank_history(pool: &PgPool, path: &Path) -> Result<u64, PgError> {
    if !path.exists() {
        return Err(PgError::MissingInput(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), "loading sales rank history");
    let started = Instant::now();
    let rows = copy_csv_file(pool, COPY_SALES_RANK_HISTORY, path).await?;
    log_load("sales rank history", rows, started.elapsed().as_secs_f64());
    Ok(rows)
}

/// Bulk-loads `product_metrics.csv`. The file is optional: when missing,
/// the load is skipped with a warning and `0` is returned.
///
/// # Errors
///
/// Returns an I/O or database error from the COPY pass.
pub async fn load_product_metrics(pool: &PgPool, path: &Path) -> Result<u64, PgError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "product metrics file not found, skipping");
        return Ok(0);
    }
    tracing::info!(path = %path.display(), "loading product metrics");
    let started = Instant::now();
    let rows = copy_csv_file(pool, COPY_PRODUCT_METRICS, path).await?;
    log_load("product metrics", rows, started.elapsed().as_secs_f64());
    Ok(rows)
}

fn log_load(what: &str, rows: u64, elapsed_secs: f64) {
    #[allow(clippy::cast_precision_loss)]
    let throughput = if elapsed_secs > 0.0 {
        rows as f64 / elapsed_secs
    } else {
        0.0
    };
    tracing::info!(
        rows,
        elapsed_secs = format!("{elapsed_secs:.2}"),
        rows_per_sec = format!("{throughput:.0}"),
        "loaded {what}"
    );
}

/// Runs the full relational load in its fixed order, then verifies
/// integrity.
///
/// # Errors
///
/// Returns the first loader error; a missing required file aborts the run.
pub async fn run_full_load(pool: &PgPool, data_dir: &Path) -> Result<LoadStats, PgError> {
    let started = Instant::now();
    tracing::info!(data_dir = %data_dir.display(), "starting relational CSV load");

    // Products must land first to satisfy the history foreign keys.
    let products_count = load_products(pool, &data_dir.join("products.csv")).await?;
    let price_history_count =
        load_price_history(pool, &data_dir.join("price_history.csv")).await?;
    let sales_rank_history_count =
        load_sales_rank_history(pool, &data_dir.join("sales_rank_history.csv")).await?;
    let product_metrics_count =
        load_product_metrics(pool, &data_dir.join("product_metrics.csv")).await?;

    let integrity = verify_integrity(pool).await?;

    let total_elapsed_secs = started.elapsed().as_secs_f64();
    let stats = LoadStats {
        products_count,
        price_history_count,
        sales_rank_history_count,
        product_metrics_count,
        total_elapsed_secs,
        integrity,
    };
    tracing::info!(
        total_rows = stats.total_rows(),
        elapsed_secs = format!("{total_elapsed_secs:.2}"),
        "relational load complete"
    );
    Ok(stats)
}

/// Counts rows per table and orphaned history rows (history ASINs with no
/// matching product). Orphans are reported as warnings, never errors.
///
/// # Errors
///
/// Returns [`PgError::Sqlx`] if any verification query fails.
pub async fn verify_integrity(pool: &PgPool) -> Result<IntegrityReport, PgError> {
    tracing::info!("verifying data integrity");

    let products_count = count_rows(pool, "SELECT COUNT(*) FROM products").await?;
    let price_history_count = count_rows(pool, "SELECT COUNT(*) FROM price_history").await?;
    let sales_rank_history_count =
        count_rows(pool, "SELECT COUNT(*) FROM sales_rank_history").await?;
    let product_metrics_count = count_rows(pool, "SELECT COUNT(*) FROM product_metrics").await?;

    let orphaned_price_history = count_rows(
        pool,
        "SELECT COUNT(*) FROM price_history ph \
         LEFT JOIN products p ON ph.asin = p.asin \
         WHERE p.asin IS NULL",
    )
    .await?;
    let orphaned_sales_rank_history = count_rows(
        pool,
        "SELECT COUNT(*) FROM sales_rank_history srh \
         LEFT JOIN products p ON srh.asin = p.asin \
         WHERE p.asin IS NULL",
    )
    .await?;
    let orphaned_product_metrics = count_rows(
        pool,
        "SELECT COUNT(*) FROM product_metrics pm \
         LEFT JOIN products p ON pm.asin = p.asin \
         WHERE p.asin IS NULL",
    )
    .await?;

    let (avg_price_records_per_product, max_price_records_per_product) =
        history_density(pool, "price_history").await?;
    let (avg_rank_records_per_product, max_rank_records_per_product) =
        history_density(pool, "sales_rank_history").await?;

    let report = IntegrityReport {
        products_count,
        price_history_count,
        sales_rank_history_count,
        product_metrics_count,
        orphaned_price_history,
        orphaned_sales_rank_history,
        orphaned_product_metrics,
        avg_price_records_per_product,
        max_price_records_per_product,
        avg_rank_records_per_product,
        max_rank_records_per_product,
    };

    tracing::info!(
        products = report.products_count,
        price_history = report.price_history_count,
        sales_rank_history = report.sales_rank_history_count,
        product_metrics = report.product_metrics_count,
        "row counts"
    );
    if report.orphaned_price_history > 0 {
        tracing::warn!(
            count = report.orphaned_price_history,
            "orphaned price_history rows found"
        );
    }
    if report.orphaned_sales_rank_history > 0 {
        tracing::warn!(
            count = report.orphaned_sales_rank_history,
            "orphaned sales_rank_history rows found"
        );
    }
    if report.orphaned_product_metrics > 0 {
        tracing::warn!(
            count = report.orphaned_product_metrics,
            "orphaned product_metrics rows found"
        );
    }

    Ok(report)
}

async fn count_rows(pool: &PgPool, query: &str) -> Result<i64, PgError> {
    let count: i64 = sqlx::query_scalar(query).fetch_one(pool).await?;
    Ok(count)
}

/// Average and maximum history points per product for a history table.
async fn history_density(pool: &PgPool, table: &str) -> Result<(f64, i64), PgError> {
    // `table` is one of two compile-time constants, never user input.
    let query = format!(
        "SELECT COALESCE(AVG(n), 0)::float8, COALESCE(MAX(n), 0)::bigint \
         FROM (SELECT COUNT(*) AS n FROM {table} GROUP BY asin) sub"
    );
    let row: (f64, i64) = sqlx::query_as(&query).fetch_one(pool).await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn copy_statements_name_explicit_columns_and_csv_dialect() {
        for statement in [
            COPY_PRODUCTS,
            COPY_PRICE_HISTORY,
            COPY_SALES_RANK_HISTORY,
            COPY_PRODUCT_METRICS,
        ] {
            assert!(statement.contains("FROM STDIN"));
            assert!(statement.contains("FORMAT csv"));
            assert!(statement.contains("asin,"));
        }
        assert!(COPY_PRICE_HISTORY.contains("price_bucket"));
        assert!(COPY_SALES_RANK_HISTORY.contains("rank_bucket"));
    }

    #[test]
    fn preprocess_rewrites_float_review_counts_as_integers() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("products.csv");
        let dst = dir.path().join("products_clean.csv");
        let mut f = std::fs::File::create(&src).unwrap();
        writeln!(
            f,
            "asin,title,brand,source_category,current_price,current_sales_rank,rating,review_count"
        )
        .unwrap();
        writeln!(f, "B001,Widget,Acme,Tools,9.99,120.0,4.5,152.0").unwrap();
        writeln!(f, "B002,Gadget,Acme,Tools,19.99,88.0,4.0,").unwrap();

        let rows = preprocess_products_csv(&src, &dst).unwrap();
        assert_eq!(rows, 2);

        let out = std::fs::read_to_string(&dst).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("review_count"));
        assert!(lines[1].ends_with(",152"), "got: {}", lines[1]);
        // Blank review counts become 0, mirroring fill-with-zero semantics.
        assert!(lines[2].ends_with(",0"), "got: {}", lines[2]);
    }

    #[test]
    fn preprocess_leaves_files_without_review_count_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("other.csv");
        let dst = dir.path().join("other_clean.csv");
        std::fs::write(&src, "asin,date,price_usd\nB001,2024-01-01,9.99\n").unwrap();

        let rows = preprocess_products_csv(&src, &dst).unwrap();
        assert_eq!(rows, 1);
        let out = std::fs::read_to_string(&dst).unwrap();
        assert!(out.contains("B001,2024-01-01,9.99"));
    }

    #[test]
    fn integrity_report_sums_orphans() {
        let report = IntegrityReport {
            orphaned_price_history: 2,
            orphaned_sales_rank_history: 3,
            orphaned_product_metrics: 0,
            ..IntegrityReport::default()
        };
        assert_eq!(report.total_orphans(), 5);
    }
}
