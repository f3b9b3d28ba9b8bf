//! Bar charts ("Simplified" mode): one merged value per horizontal group

use crate::data::Run;
use crate::error::{Error, Result};
use crate::field_path;
use crate::order;
use crate::query::{BarChart, BucketColumn, ChartRequest, VerticalAxis};
use crate::store::{AggregateQuery, RunStore};
use std::sync::Arc;
use tracing::{debug, info};

/// What a bar measures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarMeasure {
    Bucket(BucketColumn),
    Metric(String),
}

/// The single measure of a bar chart request
pub fn measure(request: &ChartRequest) -> Result<BarMeasure> {
    let axis = match request.vertical_axes.as_slice() {
        [axis] => axis,
        axes => {
            return Err(Error::config(format!(
                "A bar chart takes exactly one vertical axis, got {}",
                axes.len()
            )))
        }
    };

    match axis {
        VerticalAxis::Buckets { column, .. } => Ok(BarMeasure::Bucket(column.parse()?)),
        VerticalAxis::Metric { metric, .. } => {
            field_path::parse_path(metric)?;
            Ok(BarMeasure::Metric(metric.clone()))
        }
        VerticalAxis::Errors { .. } | VerticalAxis::MetricsAll { .. } => Err(Error::config(format!(
            "Vertical axis '{}' is not supported on bar charts",
            axis.kind()
        ))),
    }
}

/// Aggregate `runs` into one bar per horizontal group
pub async fn build<S: RunStore>(
    store: &Arc<S>,
    request: &ChartRequest,
    runs: Vec<Run>,
) -> Result<BarChart> {
    let measure = measure(request)?;
    let group_by = &request.horizontal_axis.database_field;

    let run_labels: Vec<(String, String)> = runs
        .iter()
        .filter_map(|run| {
            field_path::label_at(run.params.as_map(), group_by).map(|label| (run.id.clone(), label))
        })
        .collect();
    let without_field = runs.len() - run_labels.len();
    if without_field > 0 {
        debug!(
            field = %group_by,
            runs = without_field,
            "Runs without the horizontal field are left out of the chart"
        );
    }

    let merge_policy = request.merge_policy;
    let merge_algorithm = request.merge_algorithm;
    let trimming_seconds = request.trimming_seconds;
    let task_store = Arc::clone(store);

    let results = tokio::task::spawn_blocking(move || {
        let query = AggregateQuery {
            run_labels: &run_labels,
            merge_policy,
            merge_algorithm,
            trimming_seconds,
        };
        match &measure {
            BarMeasure::Bucket(column) => task_store.aggregate_buckets(&query, *column),
            BarMeasure::Metric(metric) => task_store.aggregate_metric(&query, metric),
        }
    })
    .await??;

    let results = order::sort_results(results, request.horizontal_axis.result_type)?;

    info!(
        runs = runs.len(),
        groups = results.len(),
        merge = ?merge_policy,
        "Built bar chart"
    );

    let mut chart = BarChart {
        runs,
        labels: Vec::with_capacity(results.len()),
        values: Vec::with_capacity(results.len()),
        run_ids_per_label: Vec::with_capacity(results.len()),
    };
    for result in results {
        chart.labels.push(result.label);
        chart.values.push(result.value);
        chart.run_ids_per_label.push(result.run_ids);
    }

    Ok(chart)
}
