//! Aggregation pipelines mirroring the relational analytical queries.
//!
//! Pipeline builders are pure functions of the query parameters and a
//! caller-supplied clock, so the shapes can be asserted offline. Executor
//! functions drain the cursor and deserialize into typed result documents.

use chrono::{DateTime as ChronoDateTime, Duration, NaiveTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, Bson, DateTime, Document};
use mongodb::Collection;
use serde::Deserialize;

use crate::MongoError;

/// One month-by-category price trend bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceTrendDoc {
    /// Missing for products loaded without a category.
    #[serde(default)]
    pub category: Option<String>,
    pub month: DateTime,
    pub product_count: i64,
    /// Null when every point in the bucket has a null price; SQL aggregates
    /// behave the same way.
    #[serde(default)]
    pub avg_price: Option<f64>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub price_stddev: Option<f64>,
}

/// One entry of the rank-improvement leaderboard.
#[derive(Debug, Clone, Deserialize)]
pub struct RankImprovementDoc {
    pub asin: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub date: DateTime,
    pub sales_rank: f64,
    pub previous_rank: f64,
    pub rank_change: f64,
}

/// Per-product rating and review aggregates within a brand.
#[derive(Debug, Clone, Deserialize)]
pub struct BrandAnalysisDoc {
    pub brand: String,
    pub asin: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub avg_review_count: Option<f64>,
    #[serde(default)]
    pub max_review_count: Option<f64>,
    pub metric_count: i64,
}

/// One row of the brand performance leaderboard.
#[derive(Debug, Clone, Deserialize)]
pub struct BrandLeaderboardDoc {
    pub brand: String,
    pub product_count: i64,
    #[serde(default)]
    pub avg_price: Option<f64>,
    #[serde(default)]
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub avg_sales_rank: Option<f64>,
    #[serde(default)]
    pub total_reviews: Option<f64>,
}

/// Midnight boundary of `now`, the day granularity `CURRENT_DATE`
/// arithmetic uses on the relational side. History dates are stored at
/// midnight UTC, so cutoffs must sit on the same boundary.
fn day_start(now: ChronoDateTime<Utc>) -> ChronoDateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// History cutoff for a lookback expressed in months. Months are taken as
/// 30 days, matching the relational `make_interval` comparisons closely
/// enough for trend windows.
fn months_ago(now: ChronoDateTime<Utc>, months: i64) -> DateTime {
    DateTime::from_chrono(day_start(now) - Duration::days(months * 30))
}

/// Monthly price trend per category over the embedded price arrays.
///
/// `$dateTrunc` with a month unit groups the stored datetimes by calendar
/// month, the document-side equivalent of `DATE_TRUNC('month', date)`.
#[must_use]
pub fn price_trend_pipeline(
    now: ChronoDateTime<Utc>,
    months: i64,
    category: Option<&str>,
) -> Vec<Document> {
    let cutoff = months_ago(now, months);
    let mut matcher = doc! {
        "price_history.date": { "$gte": cutoff },
    };
    if let Some(category) = category {
        matcher.insert("category", category);
    }

    vec![
        doc! { "$unwind": "$price_history" },
        doc! { "$match": matcher },
        doc! { "$group": {
            "_id": {
                "category": "$category",
                "month": { "$dateTrunc": { "date": "$price_history.date", "unit": "month" } },
            },
            "asins": { "$addToSet": "$asin" },
            "avg_price": { "$avg": "$price_history.price_usd" },
            "min_price": { "$min": "$price_history.price_usd" },
            "max_price": { "$max": "$price_history.price_usd" },
            "price_stddev": { "$stdDevPop": "$price_history.price_usd" },
        }},
        doc! { "$project": {
            "_id": 0,
            "category": "$_id.category",
            "month": "$_id.month",
            "product_count": { "$size": "$asins" },
            "avg_price": 1,
            "min_price": 1,
            "max_price": 1,
            "price_stddev": 1,
        }},
        doc! { "$sort": { "month": -1, "category": 1 } },
    ]
}

/// Products whose sales rank improved the most, day over day.
///
/// There is no window-function `LAG` over embedded arrays, so after
/// grouping each product's points in date order the previous rank is
/// recovered by an index-shifted `$map` over `$range(1, n)`.
#[must_use]
pub fn rank_improvement_pipeline(
    now: ChronoDateTime<Utc>,
    days: i64,
    limit: i64,
) -> Vec<Document> {
    let cutoff = DateTime::from_chrono(day_start(now) - Duration::days(days));
    vec![
        doc! { "$unwind": "$sales_rank_history" },
        doc! { "$match": {
            "sales_rank_history.date": { "$gte": cutoff },
            "sales_rank_history.sales_rank": { "$ne": Bson::Null },
        }},
        doc! { "$sort": { "asin": 1, "sales_rank_history.date": 1 } },
        doc! { "$group": {
            "_id": "$asin",
            "title": { "$first": "$title" },
            "brand": { "$first": "$brand" },
            "category": { "$first": "$category" },
            "points": { "$push": {
                "date": "$sales_rank_history.date",
                "sales_rank": "$sales_rank_history.sales_rank",
            }},
        }},
        doc! { "$project": {
            "title": 1,
            "brand": 1,
            "category": 1,
            "changes": { "$map": {
                "input": { "$range": [1, { "$size": "$points" }] },
                "as": "idx",
                "in": {
                    "date": { "$arrayElemAt": ["$points.date", "$$idx"] },
                    "sales_rank": { "$arrayElemAt": ["$points.sales_rank", "$$idx"] },
                    "previous_rank": {
                        "$arrayElemAt": ["$points.sales_rank", { "$subtract": ["$$idx", 1] }]
                    },
                    "rank_change": { "$subtract": [
                        { "$arrayElemAt": ["$points.sales_rank", "$$idx"] },
                        { "$arrayElemAt": ["$points.sales_rank", { "$subtract": ["$$idx", 1] }] },
                    ]},
                },
            }},
        }},
        doc! { "$unwind": "$changes" },
        doc! { "$match": { "changes.rank_change": { "$lt": 0 } } },
        doc! { "$sort": { "changes.rank_change": 1 } },
        doc! { "$limit": limit },
        doc! { "$project": {
            "_id": 0,
            "asin": "$_id",
            "title": 1,
            "brand": 1,
            "category": 1,
            "date": "$changes.date",
            "sales_rank": "$changes.sales_rank",
            "previous_rank": "$changes.previous_rank",
            "rank_change": "$changes.rank_change",
        }},
    ]
}

/// Per-product rating and review aggregates, optionally restricted to one
/// brand. Grouping by brand and asin mirrors the relational `GROUP BY
/// p.brand, p.asin, p.title`.
#[must_use]
pub fn brand_analysis_pipeline(brand: Option<&str>) -> Vec<Document> {
    let mut matcher = doc! { "brand": { "$ne": Bson::Null } };
    if let Some(brand) = brand {
        matcher.insert("brand", brand);
    }
    vec![
        doc! { "$match": matcher },
        doc! { "$group": {
            "_id": { "brand": "$brand", "asin": "$asin" },
            "title": { "$first": "$title" },
            "avg_rating": { "$avg": "$rating" },
            "avg_review_count": { "$avg": "$review_count" },
            "max_review_count": { "$max": "$review_count" },
            "metric_count": { "$sum": 1 },
        }},
        doc! { "$project": {
            "_id": 0,
            "brand": "$_id.brand",
            "asin": "$_id.asin",
            "title": 1,
            "avg_rating": 1,
            "avg_review_count": 1,
            "max_review_count": 1,
            "metric_count": 1,
        }},
        doc! { "$sort": { "brand": 1, "avg_rating": -1, "avg_review_count": -1 } },
    ]
}

/// Best-ranked brands among those with at least `min_products` products.
#[must_use]
pub fn brand_leaderboard_pipeline(min_products: i64, limit: i64) -> Vec<Document> {
    vec![
        doc! { "$match": { "brand": { "$ne": Bson::Null } } },
        doc! { "$group": {
            "_id": "$brand",
            "product_count": { "$sum": 1 },
            "avg_price": { "$avg": "$current_price" },
            "avg_rating": { "$avg": "$rating" },
            "avg_sales_rank": { "$avg": "$current_sales_rank" },
            "total_reviews": { "$sum": "$review_count" },
        }},
        doc! { "$match": { "product_count": { "$gte": min_products } } },
        doc! { "$project": {
            "_id": 0,
            "brand": "$_id",
            "product_count": 1,
            "avg_price": 1,
            "avg_rating": 1,
            "avg_sales_rank": 1,
            "total_reviews": 1,
        }},
        doc! { "$sort": { "avg_sales_rank": 1 } },
        doc! { "$limit": limit },
    ]
}

/// Runs a pipeline and collects the raw result documents.
///
/// # Errors
///
/// Returns a driver error if the aggregation fails or the cursor breaks.
pub async fn aggregate_documents(
    collection: &Collection<Document>,
    pipeline: Vec<Document>,
) -> Result<Vec<Document>, MongoError> {
    let cursor = collection.aggregate(pipeline).await?;
    Ok(cursor.try_collect().await?)
}

/// # Errors
///
/// Returns a driver error for a failed aggregation or a BSON error if a
/// result document does not match the expected shape.
pub async fn price_trend_by_category(
    collection: &Collection<Document>,
    now: ChronoDateTime<Utc>,
    months: i64,
    category: Option<&str>,
) -> Result<Vec<PriceTrendDoc>, MongoError> {
    let docs = aggregate_documents(collection, price_trend_pipeline(now, months, category)).await?;
    docs.into_iter()
        .map(|d| from_document(d).map_err(MongoError::from))
        .collect()
}

/// # Errors
///
/// Returns a driver error for a failed aggregation or a BSON error if a
/// result document does not match the expected shape.
pub async fn rank_improvement_leaderboard(
    collection: &Collection<Document>,
    now: ChronoDateTime<Utc>,
    days: i64,
    limit: i64,
) -> Result<Vec<RankImprovementDoc>, MongoError> {
    let docs = aggregate_documents(collection, rank_improvement_pipeline(now, days, limit)).await?;
    docs.into_iter()
        .map(|d| from_document(d).map_err(MongoError::from))
        .collect()
}

/// # Errors
///
/// Returns a driver error for a failed aggregation or a BSON error if a
/// result document does not match the expected shape.
pub async fn brand_analysis(
    collection: &Collection<Document>,
    brand: Option<&str>,
) -> Result<Vec<BrandAnalysisDoc>, MongoError> {
    let docs = aggregate_documents(collection, brand_analysis_pipeline(brand)).await?;
    docs.into_iter()
        .map(|d| from_document(d).map_err(MongoError::from))
        .collect()
}

/// # Errors
///
/// Returns a driver error for a failed aggregation or a BSON error if a
/// result document does not match the expected shape.
pub async fn brand_leaderboard(
    collection: &Collection<Document>,
    min_products: i64,
    limit: i64,
) -> Result<Vec<BrandLeaderboardDoc>, MongoError> {
    let docs = aggregate_documents(collection, brand_leaderboard_pipeline(min_products, limit)).await?;
    docs.into_iter()
        .map(|d| from_document(d).map_err(MongoError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> ChronoDateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn price_trend_groups_by_truncated_month() {
        let pipeline = price_trend_pipeline(fixed_now(), 6, None);
        let group = &pipeline[2];
        let id = group
            .get_document("$group")
            .unwrap()
            .get_document("_id")
            .unwrap();
        let month = id.get_document("month").unwrap();
        let trunc = month.get_document("$dateTrunc").unwrap();
        assert_eq!(trunc.get_str("unit").unwrap(), "month");
        assert_eq!(trunc.get_str("date").unwrap(), "$price_history.date");
    }

    #[test]
    fn price_trend_cutoff_is_thirty_day_months() {
        let pipeline = price_trend_pipeline(fixed_now(), 6, None);
        let matcher = pipeline[1].get_document("$match").unwrap();
        let cutoff = matcher
            .get_document("price_history.date")
            .unwrap()
            .get_datetime("$gte")
            .unwrap();
        let expected = fixed_now() - Duration::days(180);
        assert_eq!(cutoff.to_chrono(), expected);
    }

    #[test]
    fn price_trend_filters_match_the_relational_predicates() {
        // The SQL twin filters on the date window and the optional category
        // only, so null prices must flow into the aggregates here too.
        let none = price_trend_pipeline(fixed_now(), 6, None);
        let matcher = none[1].get_document("$match").unwrap();
        assert_eq!(matcher.keys().collect::<Vec<_>>(), ["price_history.date"]);

        let some = price_trend_pipeline(fixed_now(), 6, Some("Tools"));
        let matcher = some[1].get_document("$match").unwrap();
        assert_eq!(
            matcher.keys().collect::<Vec<_>>(),
            ["price_history.date", "category"]
        );
    }

    #[test]
    fn window_cutoffs_sit_on_the_midnight_boundary() {
        // History dates are stored at midnight UTC and the SQL windows are
        // anchored on CURRENT_DATE, so an afternoon clock must not push a
        // boundary-day observation out of the window.
        let afternoon = Utc.with_ymd_and_hms(2024, 6, 15, 15, 30, 0).unwrap();

        let trend = price_trend_pipeline(afternoon, 6, None);
        let cutoff = trend[1]
            .get_document("$match")
            .unwrap()
            .get_document("price_history.date")
            .unwrap()
            .get_datetime("$gte")
            .unwrap();
        assert_eq!(
            cutoff.to_chrono(),
            Utc.with_ymd_and_hms(2023, 12, 18, 0, 0, 0).unwrap()
        );

        let rank = rank_improvement_pipeline(afternoon, 30, 10);
        let cutoff = rank[1]
            .get_document("$match")
            .unwrap()
            .get_document("sales_rank_history.date")
            .unwrap()
            .get_datetime("$gte")
            .unwrap();
        assert_eq!(
            cutoff.to_chrono(),
            Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn price_trend_category_filter_is_optional() {
        let none = price_trend_pipeline(fixed_now(), 6, None);
        assert!(!none[1]
            .get_document("$match")
            .unwrap()
            .contains_key("category"));

        let some = price_trend_pipeline(fixed_now(), 6, Some("Tools"));
        assert_eq!(
            some[1]
                .get_document("$match")
                .unwrap()
                .get_str("category")
                .unwrap(),
            "Tools"
        );
    }

    #[test]
    fn rank_improvement_shifts_indexes_for_previous_rank() {
        let pipeline = rank_improvement_pipeline(fixed_now(), 90, 20);
        let project = pipeline[4].get_document("$project").unwrap();
        let map = project
            .get_document("changes")
            .unwrap()
            .get_document("$map")
            .unwrap();
        let input = map.get("input").unwrap();
        assert!(matches!(input, Bson::Document(d) if d.contains_key("$range")));

        // The last stage keeps only improvements and caps the output.
        assert_eq!(pipeline[6].get_document("$match").unwrap().len(), 1);
        assert_eq!(pipeline[8].get_i64("$limit").unwrap(), 20);
    }

    #[test]
    fn brand_pipelines_exclude_null_brands() {
        for pipeline in [
            brand_analysis_pipeline(None),
            brand_leaderboard_pipeline(5, 20),
        ] {
            let matcher = pipeline[0].get_document("$match").unwrap();
            let brand = matcher.get_document("brand").unwrap();
            assert!(matches!(brand.get("$ne"), Some(Bson::Null)));
        }
    }

    #[test]
    fn brand_analysis_filter_replaces_the_null_guard() {
        let pipeline = brand_analysis_pipeline(Some("Acme"));
        let matcher = pipeline[0].get_document("$match").unwrap();
        assert_eq!(matcher.get_str("brand").unwrap(), "Acme");
    }

    #[test]
    fn brand_leaderboard_filters_small_brands_and_sorts_by_rank() {
        let pipeline = brand_leaderboard_pipeline(5, 20);
        let count_filter = pipeline[2].get_document("$match").unwrap();
        assert_eq!(
            count_filter
                .get_document("product_count")
                .unwrap()
                .get_i64("$gte")
                .unwrap(),
            5
        );
        let sort = pipeline[4].get_document("$sort").unwrap();
        assert_eq!(sort.get_i32("avg_sales_rank").unwrap(), 1);
    }

    #[test]
    fn result_docs_deserialize_from_pipeline_output() {
        let doc = doc! {
            "brand": "Acme",
            "asin": "B000000001",
            "title": "Cordless Drill",
            "avg_rating": 4.1,
            "avg_review_count": 152.0,
            "max_review_count": 152.0,
            "metric_count": 1_i64,
        };
        let parsed: BrandAnalysisDoc = from_document(doc).unwrap();
        assert_eq!(parsed.brand, "Acme");
        assert_eq!(parsed.asin, "B000000001");
        assert_eq!(parsed.metric_count, 1);
        assert_eq!(parsed.avg_rating, Some(4.1));

        // A bucket where every observed price is null still produces a row,
        // just with null aggregates.
        let doc = doc! {
            "month": DateTime::from_millis(0),
            "product_count": 3_i64,
            "avg_price": Bson::Null,
            "min_price": Bson::Null,
            "max_price": Bson::Null,
            "price_stddev": Bson::Null,
        };
        let parsed: PriceTrendDoc = from_document(doc).unwrap();
        assert_eq!(parsed.product_count, 3);
        assert!(parsed.category.is_none());
        assert!(parsed.avg_price.is_none());
        assert!(parsed.price_stddev.is_none());
    }
}
