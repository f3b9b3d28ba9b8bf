//! Run store access
//!
//! The engine only talks to storage through [`RunStore`]. Every method is a
//! single read-only query, so callers may run several of them concurrently
//! and may abandon any of them without leaving partial state behind.

use crate::containment::CompiledFilter;
use crate::data::{BarResult, Run, RunEvent, SdkInfo, SeriesPoint};
use crate::error::Result;
use crate::query::{Aggregation, BucketColumn};
use chrono::{DateTime, Utc};

pub mod sqlite;

pub use sqlite::SqliteRunStore;

/// Parameters of a grouped-aggregate (bar chart) query
#[derive(Debug, Clone)]
pub struct AggregateQuery<'a> {
    /// `(run id, group label)` of every run allowed to contribute
    pub run_labels: &'a [(String, String)],
    /// Merge of the per-run values within a group
    pub merge_policy: Aggregation,
    /// Reduction of one run's samples to a single value
    pub merge_algorithm: Aggregation,
    /// Samples earlier than this offset are ignored
    pub trimming_seconds: i64,
}

/// Time window and resolution of a per-run series query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesWindow {
    pub trimming_seconds: i64,
    /// Width of the output buckets; `None` keeps the stored resolution
    pub bucketise_seconds: Option<i64>,
    /// Reduction applied when several samples fall into one output bucket
    pub merge: Aggregation,
}

impl Default for SeriesWindow {
    fn default() -> Self {
        Self {
            trimming_seconds: 0,
            bucketise_seconds: None,
            merge: Aggregation::Average,
        }
    }
}

impl SeriesWindow {
    /// Output bucket width in seconds
    pub fn width(&self) -> i64 {
        self.bucketise_seconds.unwrap_or(1).max(1)
    }
}

/// Read access to runs, their samples and reference lists
pub trait RunStore: Send + Sync + 'static {
    /// Runs whose params contain the filter's pattern (exclusions are not applied)
    fn find_runs(&self, filter: &CompiledFilter) -> Result<Vec<Run>>;

    fn run(&self, run_id: &str) -> Result<Option<Run>>;

    /// One unordered [`BarResult`] per group of a bucket column
    fn aggregate_buckets(&self, query: &AggregateQuery<'_>, column: BucketColumn)
        -> Result<Vec<BarResult>>;

    /// One unordered [`BarResult`] per group of a per-sample metric
    fn aggregate_metric(&self, query: &AggregateQuery<'_>, metric: &str) -> Result<Vec<BarResult>>;

    fn bucket_series(
        &self,
        run_id: &str,
        column: BucketColumn,
        window: &SeriesWindow,
    ) -> Result<Vec<SeriesPoint>>;

    /// Only samples where the metric is present and numeric produce points
    fn metric_series(&self, run_id: &str, metric: &str, window: &SeriesWindow)
        -> Result<Vec<SeriesPoint>>;

    /// Numeric metric keys recorded for a run, sorted
    fn metric_keys(&self, run_id: &str) -> Result<Vec<String>>;

    /// Sum of every error category per bucket
    fn error_series(&self, run_id: &str, window: &SeriesWindow) -> Result<Vec<SeriesPoint>>;

    fn first_bucket_time(&self, run_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Events of a run in time order; an empty `event_types` means every type
    fn run_events(&self, run_id: &str, event_types: &[String]) -> Result<Vec<RunEvent>>;

    /// Distinct cluster versions, ascending
    fn cluster_versions(&self) -> Result<Vec<String>>;

    /// Every SDK language with its distinct versions, ascending
    fn sdks(&self) -> Result<Vec<SdkInfo>>;
}
