//! Data structures for stored runs and their samples

use crate::field_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path of the SDK language inside a run's params
pub const SDK_LANGUAGE_PATH: &str = "impl.language";
/// Path of the SDK version inside a run's params
pub const SDK_VERSION_PATH: &str = "impl.version";
/// Path of the server version inside a run's params
pub const CLUSTER_VERSION_PATH: &str = "cluster.version";

/// The JSON params of a run: `cluster`, `impl`, `workload` and `vars` blobs
///
/// Kept as an untyped map so operators can group and filter by any field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct RunParams(pub Map<String, Value>);

impl RunParams {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Value at a dotted path, e.g. `impl.version`
    pub fn get(&self, path: &str) -> Option<&Value> {
        field_path::get_in(&self.0, path)
    }

    /// String value at a dotted path; non-string values are not coerced
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn sdk_language(&self) -> Option<&str> {
        self.get_str(SDK_LANGUAGE_PATH)
    }

    pub fn sdk_version(&self) -> Option<&str> {
        self.get_str(SDK_VERSION_PATH)
    }
}

impl From<Value> for RunParams {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// One recorded benchmark execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    /// Unique run identifier
    pub id: String,
    /// When the run was recorded
    pub datetime: DateTime<Utc>,
    /// Cluster, SDK, workload and runtime parameters
    pub params: RunParams,
}

/// One fixed-width time bucket of aggregated samples for a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub time_offset_secs: i64,
    pub datetime: DateTime<Utc>,
    #[serde(default)]
    pub operations_total: i64,
    #[serde(default)]
    pub operations_success: i64,
    #[serde(default)]
    pub operations_failed: i64,
    #[serde(default)]
    pub duration_min_us: Option<f64>,
    #[serde(default)]
    pub duration_max_us: Option<f64>,
    #[serde(default)]
    pub duration_average_us: Option<f64>,
    #[serde(default)]
    pub duration_p50_us: Option<f64>,
    #[serde(default)]
    pub duration_p95_us: Option<f64>,
    #[serde(default)]
    pub duration_p99_us: Option<f64>,
    /// Error counts keyed by error category
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub errors: Map<String, Value>,
}

/// One per-sample metrics record (e.g. process CPU, memory, GC)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub time_offset_secs: i64,
    pub initiated: DateTime<Utc>,
    pub metrics: Map<String, Value>,
}

/// A discrete timestamped event recorded during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub datetime: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// A run together with everything recorded for it, as imported into the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    #[serde(flatten)]
    pub run: Run,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
    #[serde(default)]
    pub events: Vec<RunEvent>,
}

/// A single bar-chart data point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BarResult {
    /// Grouping label (the horizontal axis value)
    pub label: String,
    /// Merged value of every run in the group
    pub value: f64,
    /// Runs that contributed to this bar, kept for drill-down
    pub run_ids: Vec<String>,
}

/// One point of a time series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub offset_seconds: i64,
    pub value: f64,
    pub run_id: String,
    pub wall_clock_time: DateTime<Utc>,
}

/// A plotted line: one run on one vertical axis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub axis_id: String,
    pub label: String,
    pub color: String,
    pub run_id: String,
    pub points: Vec<SeriesPoint>,
}

/// A run event positioned on a line chart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: String,
    pub run_id: String,
    pub offset_seconds: i64,
    pub wall_clock_time: DateTime<Utc>,
    pub label: String,
    pub event_type: String,
    /// Vertical label offset, staggered so events sharing a time stay readable
    pub y_offset: i32,
}

/// An SDK and every version recorded for it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SdkInfo {
    pub language: String,
    pub versions: Vec<String>,
}
