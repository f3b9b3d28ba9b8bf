//! perf-dashboard-core - Query compilation and aggregation for benchmark charts
//!
//! This crate turns declarative chart requests into queries over a store of
//! benchmark runs and shapes the results for plotting.
//!
//! # Features
//!
//! - Containment filters over arbitrary run parameters, with `null` leaves
//!   meaning "key absent"
//! - Version-aware run selection (latest per SDK, snapshot and code-review exclusion)
//! - Bar charts merging runs per horizontal group
//! - Line charts with one series per run and vertical axis, plus event annotations
//! - A cached view of reference data (cluster versions, SDKs)

pub mod bar;
pub mod containment;
pub mod data;
pub mod engine;
pub mod error;
pub mod field_path;
pub mod line;
pub mod order;
pub mod query;
pub mod reference;
pub mod run_filter;
pub mod store;
pub mod version;

#[cfg(test)]
mod test_support;

pub use data::{
    Annotation, BarResult, Bucket, MetricSample, Run, RunEvent, RunParams, RunRecord, SdkInfo,
    Series, SeriesPoint,
};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use query::{
    Aggregation, AnnotationRequest, BarChart, ChartMode, ChartRequest, ChartResponse,
    ComparisonFilter, HorizontalAxis, LineChart, ResultType, RunChartRequest, RunFilterMode,
    VerticalAxis,
};
pub use store::{RunStore, SqliteRunStore};
