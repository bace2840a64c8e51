//! Timing primitives for the head-to-head benchmark.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The two stores under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Postgres,
    Mongo,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Postgres => f.write_str("PostgreSQL"),
            Backend::Mongo => f.write_str("MongoDB"),
        }
    }
}

/// Timings for one query on one backend across all benchmark iterations.
///
/// A failed iteration poisons the timing: a backend that errored even once
/// has no meaningful mean and can never be declared the winner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTiming {
    pub iterations: Vec<Duration>,
    pub failures: u32,
}

impl QueryTiming {
    pub fn record_success(&mut self, elapsed: Duration) {
        self.iterations.push(elapsed);
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Mean latency over successful iterations, or `None` if any iteration
    /// failed or none ran.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        if self.failures > 0 || self.iterations.is_empty() {
            return None;
        }
        let total: Duration = self.iterations.iter().sum();
        Some(total / self.iterations.len() as u32)
    }

    #[must_use]
    pub fn mean_ms(&self) -> Option<f64> {
        self.mean().map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// Paired timings for one query on both backends, plus the first-run row
/// counts used to check the two sides are doing equivalent work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryComparison {
    pub name: String,
    pub postgres: QueryTiming,
    pub mongo: QueryTiming,
    pub postgres_rows: Option<u64>,
    pub mongo_rows: Option<u64>,
}

impl QueryComparison {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            postgres: QueryTiming::default(),
            mongo: QueryTiming::default(),
            postgres_rows: None,
            mongo_rows: None,
        }
    }

    /// `true` when both sides returned and produced different row counts,
    /// which means the pair is no longer measuring the same work.
    #[must_use]
    pub fn row_counts_diverge(&self) -> bool {
        matches!(
            (self.postgres_rows, self.mongo_rows),
            (Some(pg), Some(mongo)) if pg != mongo
        )
    }

    /// The backend with the lower mean latency. `None` when neither side
    /// produced a usable mean; a side with failures never wins.
    #[must_use]
    pub fn winner(&self) -> Option<Backend> {
        match (self.postgres.mean(), self.mongo.mean()) {
            (Some(pg), Some(mongo)) => Some(if pg <= mongo {
                Backend::Postgres
            } else {
                Backend::Mongo
            }),
            (Some(_), None) => Some(Backend::Postgres),
            (None, Some(_)) => Some(Backend::Mongo),
            (None, None) => None,
        }
    }

    /// How many times slower the losing side is. `None` unless both sides
    /// have a usable, nonzero mean.
    #[must_use]
    pub fn speedup(&self) -> Option<f64> {
        let pg = self.postgres.mean()?.as_secs_f64();
        let mongo = self.mongo.mean()?.as_secs_f64();
        let (fast, slow) = if pg <= mongo { (pg, mongo) } else { (mongo, pg) };
        if fast == 0.0 {
            return None;
        }
        Some(slow / fast)
    }
}

/// Wall-clock comparison of the two bulk loads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadComparison {
    pub postgres_secs: f64,
    pub mongo_secs: f64,
}

impl LoadComparison {
    #[must_use]
    pub fn faster(&self) -> Backend {
        if self.postgres_secs <= self.mongo_secs {
            Backend::Postgres
        } else {
            Backend::Mongo
        }
    }
}

/// On-disk footprint of the loaded datasets, in megabytes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StorageComparison {
    pub postgres_mb: f64,
    pub mongo_mb: f64,
}
