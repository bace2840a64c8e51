//! Benchmark bookkeeping: per-query timings, the JSON result report and
//! the comparison chart.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chart rendering failed: {0}")]
    Chart(String),
}

pub mod chart;
pub mod report;
pub mod timing;

pub use chart::render_comparison_chart;
pub use report::{BenchmarkReport, QuerySummary};
pub use timing::{Backend, LoadComparison, QueryComparison, QueryTiming, StorageComparison};
