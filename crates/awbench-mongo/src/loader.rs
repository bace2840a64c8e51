//! Embedded-array bulk loader for the document store.
//!
//! The two history CSVs are streamed first and grouped in memory by ASIN;
//! the products CSV is then streamed and one document per product is
//! emitted with both collected arrays embedded. Inserts go out in
//! fixed-size unordered batches, and indexes are created only after all
//! inserts complete.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use serde::Serialize;

use awbench_core::{PricePointRecord, ProductRecord, RankPointRecord};

use crate::{MongoError, PRODUCTS_COLLECTION};

/// Result of a full document-store load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MongoLoadStats {
    pub products_processed: u64,
    pub products_inserted: u64,
    pub price_points: u64,
    pub rank_points: u64,
    pub batches_failed: u64,
    /// History ASINs that never matched a product document. The document
    /// model has no foreign keys, so this is the post-hoc orphan check.
    pub orphan_price_asins: u64,
    pub orphan_rank_asins: u64,
    pub total_elapsed_secs: f64,
}

/// Loads the CSV dataset into one `products` collection with embedded
/// `price_history` and `sales_rank_history` arrays.
pub struct MongoLoader {
    collection: Collection<Document>,
    csv_chunk_size: usize,
    insert_batch_size: usize,
    price_history: HashMap<String, Vec<Document>>,
    rank_history: HashMap<String, Vec<Document>>,
}

/// Midnight-UTC BSON datetime for a calendar date. History dates are stored
/// as real datetimes so `$dateTrunc` can group them by calendar month, the
/// same way the relational side truncates.
fn bson_date(date: NaiveDate) -> DateTime {
    DateTime::from_chrono(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// One element of the embedded `price_history` array. Optional fields are
/// omitted rather than stored as nulls.
fn price_point_document(record: &PricePointRecord) -> Document {
    let mut point = doc! { "date": bson_date(record.date) };
    match record.price_usd {
        Some(price) => point.insert("price_usd", price),
        None => point.insert("price_usd", mongodb::bson::Bson::Null),
    };
    if let Some(ref category) = record.source_category {
        point.insert("source_category", category);
    }
    if let Some(ref brand) = record.brand {
        point.insert("brand", brand);
    }
    if let Some(ref bucket) = record.price_bucket {
        point.insert("price_bucket", bucket);
    }
    point
}

/// One element of the embedded `sales_rank_history` array.
fn rank_point_document(record: &RankPointRecord) -> Document {
    let mut point = doc! { "date": bson_date(record.date) };
    match record.sales_rank {
        Some(rank) => point.insert("sales_rank", rank),
        None => point.insert("sales_rank", mongodb::bson::Bson::Null),
    };
    if let Some(ref category) = record.source_category {
        point.insert("source_category", category);
    }
    if let Some(ref brand) = record.brand {
        point.insert("brand", brand);
    }
    if let Some(ref bucket) = record.rank_bucket {
        point.insert("rank_bucket", bucket);
    }
    point
}

/// Assembles one product document with both embedded history arrays.
fn product_document(
    record: &ProductRecord,
    price_history: Vec<Document>,
    rank_history: Vec<Document>,
    now: DateTime,
) -> Document {
    let mut product = doc! { "asin": record.asin.trim() };
    if let Some(ref title) = record.title {
        product.insert("title", title);
    }
    if let Some(ref brand) = record.brand {
        product.insert("brand", brand);
    }
    if let Some(ref category) = record.source_category {
        product.insert("category", category);
    }
    if let Some(price) = record.current_price {
        product.insert("current_price", price);
    }
    if let Some(rank) = record.current_sales_rank {
        product.insert("current_sales_rank", rank);
    }
    if let Some(rating) = record.rating {
        product.insert("rating", rating);
    }
    if let Some(reviews) = record.review_count {
        product.insert("review_count", reviews);
    }
    product.insert("price_history", price_history);
    product.insert("sales_rank_history", rank_history);
    product.insert("created_at", now);
    product.insert("updated_at", now);
    product
}

impl MongoLoader {
    #[must_use]
    pub fn new(db: &Database, csv_chunk_size: usize, insert_batch_size: usize) -> Self {
        Self {
            collection: db.collection::<Document>(PRODUCTS_COLLECTION),
            csv_chunk_size: csv_chunk_size.max(1),
            insert_batch_size: insert_batch_size.max(1),
            price_history: HashMap::new(),
            rank_history: HashMap::new(),
        }
    }

    /// Streams the price-history CSV and groups points by ASIN in memory.
    /// Rows with an empty ASIN are skipped. Returns the number of points
    /// collected.
    ///
    /// # Errors
    ///
    /// Returns [`MongoError::MissingInput`] if the file does not exist, or a
    /// CSV error for malformed rows.
    pub fn collect_price_history(&mut self, path: &Path) -> Result<u64, MongoError> {
        if !path.exists() {
            return Err(MongoError::MissingInput(path.to_path_buf()));
        }
        tracing::info!(path = %path.display(), "collecting price history");

        let mut reader = csv::Reader::from_path(path)?;
        let mut points: u64 = 0;
        for result in reader.deserialize::<PricePointRecord>() {
            let record = result?;
            let asin = record.asin.trim();
            if asin.is_empty() {
                continue;
            }
            self.price_history
                .entry(asin.to_string())
                .or_default()
                .push(price_point_document(&record));
            points += 1;
            self.log_collect_progress("price history", points, self.price_history.len());
        }
        tracing::info!(
            points,
            unique_asins = self.price_history.len(),
            "price history collection complete"
        );
        Ok(points)
    }

    /// Streams the sales-rank-history CSV and groups points by ASIN in
    /// memory.
    ///
    /// # Errors
    ///
    /// Returns [`MongoError::MissingInput`] if the file does not exist, or a
    /// CSV error for malformed rows.
    pub fn collect_rank_history(&mut self, path: &Path) -> Result<u64, MongoError> {
        if !path.exists() {
            return Err(MongoError::MissingInput(path.to_path_buf()));
        }
        tracing::info!(path = %path.display(), "collecting sales rank history");

        let mut reader = csv::Reader::from_path(path)?;
        let mut points: u64 = 0;
        for result in reader.deserialize::<RankPointRecord>() {
            let record = result?;
            let asin = record.asin.trim();
            if asin.is_empty() {
                continue;
            }
            self.rank_history
                .entry(asin.to_string())
                .or_default()
                .push(rank_point_document(&record));
            points += 1;
            self.log_collect_progress("sales rank history", points, self.rank_history.len());
        }
        tracing::info!(
            points,
            unique_asins = self.rank_history.len(),
            "sales rank history collection complete"
        );
        Ok(points)
    }

    fn log_collect_progress(&self, what: &str, points: u64, unique: usize) {
        let every = (self.csv_chunk_size as u64).saturating_mul(10).max(1);
        if points % every == 0 {
            tracing::info!(points, unique_asins = unique, "processing {what}");
        }
    }

    /// Streams the products CSV, emits one document per product with the
    /// collected arrays embedded, and inserts in fixed-size unordered
    /// batches.
    ///
    /// A failed batch is logged and skipped, not retried; its documents are
    /// lost. The history maps are cleared once the pass completes.
    ///
    /// # Errors
    ///
    /// Returns [`MongoError::MissingInput`] if the file does not exist, or
    /// a CSV error for malformed rows.
    pub async fn load_products(&mut self, path: &Path) -> Result<MongoLoadStats, MongoError> {
        if !path.exists() {
            return Err(MongoError::MissingInput(path.to_path_buf()));
        }
        tracing::info!(path = %path.display(), "loading products");

        let now = DateTime::now();
        let mut stats = MongoLoadStats::default();
        let mut seen_asins: HashSet<String> = HashSet::new();
        let mut batch: Vec<Document> = Vec::with_capacity(self.insert_batch_size);

        let mut reader = csv::Reader::from_path(path)?;
        for result in reader.deserialize::<ProductRecord>() {
            let record = result?;
            let asin = record.asin.trim().to_string();
            if asin.is_empty() {
                continue;
            }
            // First occurrence wins; a repeat would collide with the unique
            // asin index anyway.
            if seen_asins.contains(&asin) {
                tracing::warn!(asin = %asin, "duplicate product row skipped");
                continue;
            }

            let price = self.price_history.get(&asin).cloned().unwrap_or_default();
            let rank = self.rank_history.get(&asin).cloned().unwrap_or_default();
            batch.push(product_document(&record, price, rank, now));
            seen_asins.insert(asin);
            stats.products_processed += 1;

            if batch.len() >= self.insert_batch_size {
                self.insert_batch(std::mem::take(&mut batch), &mut stats).await;
            }
        }
        if !batch.is_empty() {
            self.insert_batch(batch, &mut stats).await;
        }

        stats.orphan_price_asins = self
            .price_history
            .keys()
            .filter(|asin| !seen_asins.contains(*asin))
            .count() as u64;
        stats.orphan_rank_asins = self
            .rank_history
            .keys()
            .filter(|asin| !seen_asins.contains(*asin))
            .count() as u64;
        if stats.orphan_price_asins > 0 {
            tracing::warn!(
                count = stats.orphan_price_asins,
                "price-history ASINs with no matching product"
            );
        }
        if stats.orphan_rank_asins > 0 {
            tracing::warn!(
                count = stats.orphan_rank_asins,
                "sales-rank ASINs with no matching product"
            );
        }

        tracing::info!(
            processed = stats.products_processed,
            inserted = stats.products_inserted,
            failed_batches = stats.batches_failed,
            "product loading complete"
        );

        // The maps are transient working state for a single load.
        self.price_history.clear();
        self.rank_history.clear();
        tracing::info!("cleared time-series maps from memory");

        Ok(stats)
    }

    async fn insert_batch(&self, batch: Vec<Document>, stats: &mut MongoLoadStats) {
        let size = batch.len();
        match self.collection.insert_many(batch).ordered(false).await {
            Ok(result) => {
                stats.products_inserted += result.inserted_ids.len() as u64;
                tracing::info!(
                    batch = size,
                    total = stats.products_processed,
                    "inserted product batch"
                );
            }
            Err(e) => {
                stats.batches_failed += 1;
                tracing::error!(
                    batch = size,
                    error = %e,
                    "failed to insert batch, continuing with next"
                );
            }
        }
    }

    /// Creates the collection indexes. Called only after all inserts
    /// complete so the bulk load is not slowed by index maintenance.
    /// Per-index failures (typically "already exists") are warnings.
    pub async fn create_indexes(&self) {
        tracing::info!("creating indexes");

        let unique = IndexOptions::builder().unique(true).build();
        let models: Vec<(&str, IndexModel)> = vec![
            (
                "asin (unique)",
                IndexModel::builder()
                    .keys(doc! { "asin": 1 })
                    .options(unique)
                    .build(),
            ),
            (
                "price_history.date",
                IndexModel::builder().keys(doc! { "price_history.date": 1 }).build(),
            ),
            (
                "sales_rank_history.date",
                IndexModel::builder()
                    .keys(doc! { "sales_rank_history.date": 1 })
                    .build(),
            ),
            ("brand", IndexModel::builder().keys(doc! { "brand": 1 }).build()),
            (
                "category",
                IndexModel::builder().keys(doc! { "category": 1 }).build(),
            ),
            (
                "title/description text",
                IndexModel::builder()
                    .keys(doc! { "title": "text", "description": "text" })
                    .build(),
            ),
        ];

        for (name, model) in models {
            match self.collection.create_index(model).await {
                Ok(_) => tracing::info!(index = name, "created index"),
                Err(e) => tracing::warn!(index = name, error = %e, "index creation skipped"),
            }
        }
        tracing::info!("index creation complete");
    }

    /// Full load: history collection, product emission, then indexes.
    ///
    /// # Errors
    ///
    /// Returns the first loader error; all three input files are required
    /// on this side.
    pub async fn run_full_load(&mut self, data_dir: &Path) -> Result<MongoLoadStats, MongoError> {
        let started = Instant::now();
        tracing::info!(data_dir = %data_dir.display(), "starting document-store CSV load");

        let price_points = self.collect_price_history(&data_dir.join("price_history.csv"))?;
        let rank_points = self.collect_rank_history(&data_dir.join("sales_rank_history.csv"))?;

        let mut stats = self.load_products(&data_dir.join("products.csv")).await?;
        stats.price_points = price_points;
        stats.rank_points = rank_points;

        self.create_indexes().await;
        self.log_embedded_stats().await;

        stats.total_elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            products = stats.products_inserted,
            elapsed_secs = format!("{:.2}", stats.total_elapsed_secs),
            "document-store load complete"
        );
        Ok(stats)
    }

    /// Logs document count and average/max embedded-array lengths.
    async fn log_embedded_stats(&self) {
        let count = match self.collection.count_documents(doc! {}).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "could not count documents");
                return;
            }
        };
        tracing::info!(products = count, "total products in database");

        let pipeline = vec![
            doc! { "$project": {
                "price_history_count": { "$size": { "$ifNull": ["$price_history", []] } },
                "sales_rank_history_count": { "$size": { "$ifNull": ["$sales_rank_history", []] } },
            }},
            doc! { "$group": {
                "_id": mongodb::bson::Bson::Null,
                "avg_price_history": { "$avg": "$price_history_count" },
                "avg_sales_rank_history": { "$avg": "$sales_rank_history_count" },
                "max_price_history": { "$max": "$price_history_count" },
                "max_sales_rank_history": { "$max": "$sales_rank_history_count" },
            }},
        ];
        match crate::queries::aggregate_documents(&self.collection, pipeline).await {
            Ok(results) => {
                if let Some(first) = results.first() {
                    tracing::info!(
                        avg_price_history = first.get_f64("avg_price_history").unwrap_or(0.0),
                        avg_sales_rank_history =
                            first.get_f64("avg_sales_rank_history").unwrap_or(0.0),
                        "embedded array statistics"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not compute embedded array statistics"),
        }
    }

    /// Handle on the underlying collection, for queries and tests.
    #[must_use]
    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_record(asin: &str, date: (i32, u32, u32), price: Option<f64>) -> PricePointRecord {
        PricePointRecord {
            asin: asin.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            price_usd: price,
            source_category: Some("Tools".to_string()),
            brand: None,
            price_bucket: None,
        }
    }

    #[test]
    fn price_point_document_stores_real_datetimes() {
        let point = price_point_document(&price_record("B001", (2024, 3, 1), Some(19.99)));
        let date = point.get_datetime("date").unwrap();
        let chrono_date = date.to_chrono();
        assert_eq!(chrono_date.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 00:00");
        assert!((point.get_f64("price_usd").unwrap() - 19.99).abs() < f64::EPSILON);
        assert_eq!(point.get_str("source_category").unwrap(), "Tools");
        assert!(!point.contains_key("brand"));
    }

    #[test]
    fn price_point_document_keeps_null_prices() {
        let point = price_point_document(&price_record("B001", (2024, 3, 1), None));
        assert!(matches!(
            point.get("price_usd"),
            Some(mongodb::bson::Bson::Null)
        ));
    }

    #[test]
    fn product_document_embeds_both_arrays() {
        let record = ProductRecord {
            asin: " B000000001 ".to_string(),
            title: Some("Widget".to_string()),
            brand: Some("Acme".to_string()),
            source_category: Some("Tools".to_string()),
            current_price: Some(9.99),
            current_sales_rank: Some(120.0),
            rating: Some(4.5),
            review_count: Some(152.0),
        };
        let price = vec![price_point_document(&price_record("B000000001", (2024, 1, 5), Some(9.99)))];
        let product = product_document(&record, price, Vec::new(), DateTime::now());

        assert_eq!(product.get_str("asin").unwrap(), "B000000001");
        // The relational column is named source_category; the document field
        // is just category.
        assert_eq!(product.get_str("category").unwrap(), "Tools");
        assert_eq!(product.get_array("price_history").unwrap().len(), 1);
        assert!(product.get_array("sales_rank_history").unwrap().is_empty());
        assert!(product.contains_key("created_at"));
        assert!(product.contains_key("updated_at"));
    }

    #[test]
    fn product_document_omits_absent_optionals() {
        let record = ProductRecord {
            asin: "B000000002".to_string(),
            title: None,
            brand: None,
            source_category: None,
            current_price: None,
            current_sales_rank: None,
            rating: None,
            review_count: None,
        };
        let product = product_document(&record, Vec::new(), Vec::new(), DateTime::now());
        assert!(!product.contains_key("title"));
        assert!(!product.contains_key("brand"));
        assert!(!product.contains_key("rating"));
    }

    #[tokio::test]
    async fn collect_price_history_skips_empty_asins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_history.csv");
        std::fs::write(
            &path,
            "asin,date,price_usd,source_category,brand,price_bucket\n\
             B001000001,2024-01-05,9.99,Tools,Acme,0-10\n\
             ,2024-01-05,1.00,Tools,Acme,0-10\n\
             B001000001,2024-02-05,8.99,Tools,Acme,0-10\n",
        )
        .unwrap();

        // Collection is never touched by the collect pass, so a dummy
        // client handle is safe here.
        let mut loader = offline_loader();
        let points = loader.collect_price_history(&path).unwrap();
        assert_eq!(points, 2);
        assert_eq!(loader.price_history.len(), 1);
        assert_eq!(loader.price_history["B001000001"].len(), 2);
    }

    #[tokio::test]
    async fn collect_price_history_missing_file_is_fatal() {
        let mut loader = offline_loader();
        let result = loader.collect_price_history(Path::new("/nonexistent/price_history.csv"));
        assert!(matches!(result, Err(MongoError::MissingInput(_))));
    }

    /// A loader whose collection handle points at an unreachable server.
    /// Only usable for the synchronous CSV-collection paths.
    fn offline_loader() -> MongoLoader {
        let client = mongodb::Client::with_options(
            mongodb::options::ClientOptions::builder()
                .hosts(vec![mongodb::options::ServerAddress::Tcp {
                    host: "localhost".to_string(),
                    port: Some(27017),
                }])
                .build(),
        )
        .unwrap();
        MongoLoader::new(&client.database("awbench_test"), 100, 10)
    }
}
