//! Declarative chart requests and their responses
//!
//! A [`ChartRequest`] says which runs to compare, what to group them by and
//! what to plot. It carries no knowledge of the run schema: grouping fields
//! and filters are plain dotted paths and JSON fragments.

use crate::data::{Annotation, Run, Series};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// How horizontal-axis labels are ordered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResultType {
    Integer,
    #[default]
    String,
    VersionSemver,
}

/// The grouping dimension of a chart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalAxis {
    /// Dotted path into the run params, e.g. `impl.version`
    pub database_field: String,
    #[serde(default)]
    pub result_type: ResultType,
}

impl HorizontalAxis {
    pub fn new(database_field: impl Into<String>, result_type: ResultType) -> Self {
        Self {
            database_field: database_field.into(),
            result_type,
        }
    }

    /// Group by SDK version, ordered semantically
    pub fn sdk_version() -> Self {
        Self::new(crate::data::SDK_VERSION_PATH, ResultType::VersionSemver)
    }
}

fn default_axis_id() -> String {
    "y".to_string()
}

/// A measured dimension of a chart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VerticalAxis {
    /// A column of the time-bucket table
    Buckets {
        column: String,
        #[serde(rename = "axisId", default = "default_axis_id")]
        axis_id: String,
    },
    /// A key inside the per-sample metrics blob
    Metric {
        metric: String,
        #[serde(rename = "axisId", default = "default_axis_id")]
        axis_id: String,
    },
    /// Sum of every error category per bucket
    Errors {
        #[serde(rename = "axisId", default = "default_axis_id")]
        axis_id: String,
    },
    /// Every numeric metric key, one series per key
    MetricsAll {
        #[serde(rename = "axisId", default = "default_axis_id")]
        axis_id: String,
    },
}

impl VerticalAxis {
    pub fn buckets(column: impl Into<String>) -> Self {
        Self::Buckets {
            column: column.into(),
            axis_id: default_axis_id(),
        }
    }

    pub fn metric(metric: impl Into<String>) -> Self {
        Self::Metric {
            metric: metric.into(),
            axis_id: default_axis_id(),
        }
    }

    pub fn errors() -> Self {
        Self::Errors {
            axis_id: default_axis_id(),
        }
    }

    pub fn axis_id(&self) -> &str {
        match self {
            Self::Buckets { axis_id, .. }
            | Self::Metric { axis_id, .. }
            | Self::Errors { axis_id }
            | Self::MetricsAll { axis_id } => axis_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buckets { .. } => "buckets",
            Self::Metric { .. } => "metric",
            Self::Errors { .. } => "errors",
            Self::MetricsAll { .. } => "metricsAll",
        }
    }
}

/// Columns of the bucket table that can be plotted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketColumn {
    OperationsTotal,
    OperationsSuccess,
    OperationsFailed,
    DurationMinUs,
    DurationMaxUs,
    DurationAverageUs,
    DurationP50Us,
    DurationP95Us,
    DurationP99Us,
}

impl BucketColumn {
    pub const ALL: [BucketColumn; 9] = [
        Self::OperationsTotal,
        Self::OperationsSuccess,
        Self::OperationsFailed,
        Self::DurationMinUs,
        Self::DurationMaxUs,
        Self::DurationAverageUs,
        Self::DurationP50Us,
        Self::DurationP95Us,
        Self::DurationP99Us,
    ];

    /// Column name in the bucket table
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OperationsTotal => "operations_total",
            Self::OperationsSuccess => "operations_success",
            Self::OperationsFailed => "operations_failed",
            Self::DurationMinUs => "duration_min_us",
            Self::DurationMaxUs => "duration_max_us",
            Self::DurationAverageUs => "duration_average_us",
            Self::DurationP50Us => "duration_p50_us",
            Self::DurationP95Us => "duration_p95_us",
            Self::DurationP99Us => "duration_p99_us",
        }
    }
}

impl FromStr for BucketColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|column| column.as_str() == s)
            .ok_or_else(|| Error::config(format!("Unknown bucket column '{}'", s)))
    }
}

/// How several values collapse into one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    #[serde(alias = "avg")]
    Average,
    Sum,
    #[serde(alias = "min")]
    Minimum,
    #[serde(alias = "max")]
    Maximum,
}

impl Aggregation {
    /// SQL aggregate function implementing this merge
    pub fn sql_function(self) -> &'static str {
        match self {
            Self::Average => "avg",
            Self::Sum => "sum",
            Self::Minimum => "min",
            Self::Maximum => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    /// One bar per horizontal group
    Simplified,
    /// One time series per run and vertical axis
    Full,
}

/// Whether several versions per SDK collapse into the highest one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunFilterMode {
    #[default]
    All,
    Latest,
    LatestNonSnapshot,
}

impl RunFilterMode {
    pub fn selects_latest(self) -> bool {
        !matches!(self, Self::All)
    }
}

/// An overlay requested on a line chart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnnotationRequest {
    /// Discrete events recorded during each run; an empty list means all types
    RunEvents {
        #[serde(rename = "eventTypes", default)]
        event_types: Vec<String>,
    },
}

/// Partial run params used to select runs
///
/// Non-null leaves must be present with the same value on a matching run.
/// A `null` leaf means the key must be absent from the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ComparisonFilter(pub Map<String, Value>);

impl ComparisonFilter {
    /// A filter that matches every run
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Value> for ComparisonFilter {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// A complete chart request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub horizontal_axis: HorizontalAxis,
    pub vertical_axes: Vec<VerticalAxis>,
    #[serde(default)]
    pub comparison_filter: ComparisonFilter,
    pub chart_mode: ChartMode,
    /// Merge of runs sharing a horizontal group (bar charts)
    #[serde(default)]
    pub merge_policy: Aggregation,
    /// Reduction of one run's samples (bar charts) or of re-bucketed samples (line charts)
    #[serde(default)]
    pub merge_algorithm: Aggregation,
    /// Warm-up seconds dropped from the start of every run
    #[serde(default)]
    pub trimming_seconds: i64,
    #[serde(default)]
    pub bucketise_seconds: Option<i64>,
    #[serde(default)]
    pub exclude_snapshots: bool,
    #[serde(default)]
    pub exclude_gerrit: bool,
    #[serde(default)]
    pub run_filter_mode: RunFilterMode,
    #[serde(default)]
    pub annotations: Vec<AnnotationRequest>,
}

impl ChartRequest {
    pub fn new(
        chart_mode: ChartMode,
        horizontal_axis: HorizontalAxis,
        vertical_axes: Vec<VerticalAxis>,
    ) -> Self {
        Self {
            horizontal_axis,
            vertical_axes,
            comparison_filter: ComparisonFilter::unconstrained(),
            chart_mode,
            merge_policy: Aggregation::default(),
            merge_algorithm: Aggregation::default(),
            trimming_seconds: 0,
            bucketise_seconds: None,
            exclude_snapshots: false,
            exclude_gerrit: false,
            run_filter_mode: RunFilterMode::All,
            annotations: Vec::new(),
        }
    }

    /// Reject parameter values that cannot produce a meaningful query
    pub fn validate(&self) -> Result<()> {
        if self.vertical_axes.is_empty() {
            return Err(Error::config("At least one vertical axis is required"));
        }
        if self.trimming_seconds < 0 {
            return Err(Error::config("trimmingSeconds cannot be negative"));
        }
        if let Some(seconds) = self.bucketise_seconds {
            if seconds <= 0 {
                return Err(Error::config("bucketiseSeconds must be greater than 0"));
            }
        }
        crate::field_path::parse_path(&self.horizontal_axis.database_field)?;
        Ok(())
    }
}

/// A line chart of one known run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunChartRequest {
    pub run_id: String,
    pub vertical_axes: Vec<VerticalAxis>,
    #[serde(default)]
    pub merge_algorithm: Aggregation,
    #[serde(default)]
    pub trimming_seconds: i64,
    #[serde(default)]
    pub bucketise_seconds: Option<i64>,
    #[serde(default)]
    pub annotations: Vec<AnnotationRequest>,
}

impl RunChartRequest {
    pub fn new(run_id: impl Into<String>, vertical_axes: Vec<VerticalAxis>) -> Self {
        Self {
            run_id: run_id.into(),
            vertical_axes,
            merge_algorithm: Aggregation::default(),
            trimming_seconds: 0,
            bucketise_seconds: None,
            annotations: Vec::new(),
        }
    }

    /// The equivalent full-mode request: no filter, grouped by SDK version
    pub fn to_chart_request(&self) -> ChartRequest {
        ChartRequest {
            merge_algorithm: self.merge_algorithm,
            trimming_seconds: self.trimming_seconds,
            bucketise_seconds: self.bucketise_seconds,
            annotations: self.annotations.clone(),
            ..ChartRequest::new(
                ChartMode::Full,
                HorizontalAxis::sdk_version(),
                self.vertical_axes.clone(),
            )
        }
    }
}

/// Bar chart output: parallel label/value/run-id sequences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BarChart {
    pub runs: Vec<Run>,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub run_ids_per_label: Vec<Vec<String>>,
}

/// Line chart output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineChart {
    pub runs: Vec<Run>,
    pub series: Vec<Series>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ChartResponse {
    Bar(BarChart),
    Line(LineChart),
}
