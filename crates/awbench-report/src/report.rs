//! The persisted benchmark report.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timing::{Backend, LoadComparison, QueryComparison, StorageComparison};
use crate::ReportError;

/// Flattened per-query summary as it appears in the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySummary {
    pub name: String,
    /// `None` means the query failed on that backend.
    pub postgres_mean_ms: Option<f64>,
    pub mongo_mean_ms: Option<f64>,
    pub postgres_rows: Option<u64>,
    pub mongo_rows: Option<u64>,
    pub winner: Option<Backend>,
    pub speedup: Option<f64>,
}

impl From<&QueryComparison> for QuerySummary {
    fn from(cmp: &QueryComparison) -> Self {
        Self {
            name: cmp.name.clone(),
            postgres_mean_ms: cmp.postgres.mean_ms(),
            mongo_mean_ms: cmp.mongo.mean_ms(),
            postgres_rows: cmp.postgres_rows,
            mongo_rows: cmp.mongo_rows,
            winner: cmp.winner(),
            speedup: cmp.speedup(),
        }
    }
}

/// Complete output of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_at: DateTime<Utc>,
    pub iterations: u32,
    pub load: LoadComparison,
    pub storage: StorageComparison,
    pub queries: Vec<QuerySummary>,
}

impl BenchmarkReport {
    #[must_use]
    pub fn new(
        iterations: u32,
        load: LoadComparison,
        storage: StorageComparison,
        comparisons: &[QueryComparison],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            iterations,
            load,
            storage,
            queries: comparisons.iter().map(QuerySummary::from).collect(),
        }
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn save_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "wrote benchmark report");
        Ok(())
    }
}
