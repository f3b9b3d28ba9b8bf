//! Line charts ("Full" mode): one time series per run and vertical axis
//!
//! Runs are ordered by their horizontal label, then each vertical axis is
//! fetched on its own blocking task. The chart is only returned once every
//! axis and the annotation lookup have succeeded.

use crate::data::{Annotation, Run, Series, SeriesPoint};
use crate::error::Result;
use crate::field_path;
use crate::order;
use crate::query::{
    AnnotationRequest, BucketColumn, ChartRequest, HorizontalAxis, LineChart, VerticalAxis,
};
use crate::store::{RunStore, SeriesWindow};
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Series colors, assigned by run position and reused cyclically
pub const PALETTE: [&str; 10] = [
    "#3fb950", "#58a6ff", "#f78166", "#a371f7", "#f9c513", "#39d353", "#79c0ff", "#ff7b72",
    "#d2a8ff", "#ffa657",
];

/// Label of runs lacking the horizontal field
pub const UNKNOWN_LABEL: &str = "unknown";

/// Distinct vertical offsets cycled through by annotations of one run
const ANNOTATION_LEVELS: usize = 4;
const ANNOTATION_STEP: i32 = 20;

pub fn color_for(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// How one run is drawn
#[derive(Debug, Clone, PartialEq)]
pub struct RunStyle {
    pub run_id: String,
    pub label: String,
    pub color: &'static str,
    pub datetime: DateTime<Utc>,
}

impl RunStyle {
    fn series(&self, axis_id: &str, label: String, points: Vec<SeriesPoint>) -> Series {
        Series {
            axis_id: axis_id.to_string(),
            label,
            color: self.color.to_string(),
            run_id: self.run_id.clone(),
            points,
        }
    }
}

/// Reject axes a line chart cannot plot before any store work starts
pub fn validate_axes(axes: &[VerticalAxis]) -> Result<()> {
    for axis in axes {
        match axis {
            VerticalAxis::Buckets { column, .. } => {
                column.parse::<BucketColumn>()?;
            }
            VerticalAxis::Metric { metric, .. } => {
                field_path::parse_path(metric)?;
            }
            VerticalAxis::Errors { .. } | VerticalAxis::MetricsAll { .. } => {}
        }
    }
    Ok(())
}

/// Order runs by label, then give each one its label and palette color
///
/// Runs without the horizontal field keep their relative order after every
/// labelled run.
pub fn style_runs(runs: Vec<Run>, axis: &HorizontalAxis) -> Result<(Vec<Run>, Vec<RunStyle>)> {
    let mut labelled = Vec::with_capacity(runs.len());
    let mut unlabelled = Vec::new();
    for run in runs {
        match field_path::label_at(run.params.as_map(), &axis.database_field) {
            Some(label) => labelled.push((label, run)),
            None => unlabelled.push((UNKNOWN_LABEL.to_string(), run)),
        }
    }

    order::sort_by_label(&mut labelled, axis.result_type, |(label, _)| label.as_str())?;

    let mut ordered = Vec::with_capacity(labelled.len() + unlabelled.len());
    let mut styles = Vec::with_capacity(ordered.capacity());
    for (index, (label, run)) in labelled.into_iter().chain(unlabelled).enumerate() {
        styles.push(RunStyle {
            run_id: run.id.clone(),
            label,
            color: color_for(index),
            datetime: run.datetime,
        });
        ordered.push(run);
    }

    Ok((ordered, styles))
}

/// Event types requested across every annotation; `None` when nothing is requested
fn requested_event_types(annotations: &[AnnotationRequest]) -> Option<Vec<String>> {
    let mut requested: Option<Vec<String>> = None;
    for annotation in annotations {
        match annotation {
            AnnotationRequest::RunEvents { event_types } => {
                let types = requested.get_or_insert_with(Vec::new);
                if event_types.is_empty() {
                    // Any unrestricted request widens to every type
                    return Some(Vec::new());
                }
                for event_type in event_types {
                    if !types.contains(event_type) {
                        types.push(event_type.clone());
                    }
                }
            }
        }
    }
    requested
}

fn axis_series<S: RunStore>(
    store: &S,
    axis: &VerticalAxis,
    styles: &[RunStyle],
    window: &SeriesWindow,
) -> Result<Vec<Series>> {
    let mut series = Vec::with_capacity(styles.len());

    match axis {
        VerticalAxis::Buckets { column, axis_id } => {
            let column: BucketColumn = column.parse()?;
            for style in styles {
                let points = store.bucket_series(&style.run_id, column, window)?;
                series.push(style.series(axis_id, style.label.clone(), points));
            }
        }
        VerticalAxis::Metric { metric, axis_id } => {
            for style in styles {
                let points = store.metric_series(&style.run_id, metric, window)?;
                if points.is_empty() {
                    debug!(run_id = %style.run_id, metric = %metric, "No samples for metric");
                    continue;
                }
                series.push(style.series(axis_id, style.label.clone(), points));
            }
        }
        VerticalAxis::Errors { axis_id } => {
            for style in styles {
                let points = store.error_series(&style.run_id, window)?;
                series.push(style.series(axis_id, style.label.clone(), points));
            }
        }
        VerticalAxis::MetricsAll { axis_id } => {
            for style in styles {
                for metric in store.metric_keys(&style.run_id)? {
                    let points = store.metric_series(&style.run_id, &metric, window)?;
                    if points.is_empty() {
                        continue;
                    }
                    let label = format!("{} {}", style.label, metric);
                    series.push(style.series(axis_id, label, points));
                }
            }
        }
    }

    Ok(series)
}

fn run_annotations<S: RunStore>(
    store: &S,
    styles: &[RunStyle],
    event_types: &[String],
) -> Result<Vec<Annotation>> {
    let mut annotations = Vec::new();

    for style in styles {
        let events = store.run_events(&style.run_id, event_types)?;
        if events.is_empty() {
            continue;
        }

        let anchor = store
            .first_bucket_time(&style.run_id)?
            .unwrap_or(style.datetime);

        for (index, event) in events.into_iter().enumerate() {
            let level = (index % ANNOTATION_LEVELS) as i32;
            annotations.push(Annotation {
                id: format!("{}-event-{}", style.run_id, index),
                run_id: style.run_id.clone(),
                offset_seconds: (event.datetime - anchor).num_seconds(),
                wall_clock_time: event.datetime,
                label: event
                    .description
                    .unwrap_or_else(|| event.event_type.clone()),
                event_type: event.event_type,
                y_offset: level * ANNOTATION_STEP,
            });
        }
    }

    Ok(annotations)
}

/// Build a line chart over `runs`
pub async fn build<S: RunStore>(
    store: &Arc<S>,
    request: &ChartRequest,
    runs: Vec<Run>,
) -> Result<LineChart> {
    validate_axes(&request.vertical_axes)?;

    let (runs, styles) = style_runs(runs, &request.horizontal_axis)?;
    let styles = Arc::new(styles);
    let window = SeriesWindow {
        trimming_seconds: request.trimming_seconds,
        bucketise_seconds: request.bucketise_seconds,
        merge: request.merge_algorithm,
    };

    let axis_tasks = request.vertical_axes.iter().cloned().map(|axis| {
        let store = Arc::clone(store);
        let styles = Arc::clone(&styles);
        let handle =
            tokio::task::spawn_blocking(move || axis_series(store.as_ref(), &axis, &styles, &window));
        async move { handle.await? }
    });

    let event_types = requested_event_types(&request.annotations);
    let annotation_task = {
        let store = Arc::clone(store);
        let styles = Arc::clone(&styles);
        async move {
            match event_types {
                Some(event_types) => {
                    tokio::task::spawn_blocking(move || {
                        run_annotations(store.as_ref(), &styles, &event_types)
                    })
                    .await?
                }
                None => Ok(Vec::new()),
            }
        }
    };

    let (per_axis, annotations) =
        futures_util::future::try_join(try_join_all(axis_tasks), annotation_task).await?;
    let series: Vec<Series> = per_axis.into_iter().flatten().collect();

    info!(
        runs = runs.len(),
        axes = request.vertical_axes.len(),
        series = series.len(),
        annotations = annotations.len(),
        "Built line chart"
    );

    Ok(LineChart {
        runs,
        series,
        annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ChartMode, ResultType};
    use crate::store::SqliteRunStore;
    use crate::test_support::{event, open_store, record, sdk_params};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(id: &str, params: serde_json::Value) -> Run {
        record(id, params, &[]).run
    }

    fn line_request(axes: Vec<VerticalAxis>) -> ChartRequest {
        ChartRequest::new(ChartMode::Full, HorizontalAxis::sdk_version(), axes)
    }

    fn store_with(records: &[crate::data::RunRecord]) -> (tempfile::TempDir, Arc<SqliteRunStore>) {
        let (dir, store) = open_store();
        store.insert_runs(records).unwrap();
        (dir, Arc::new(store))
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(color_for(0), "#3fb950");
        assert_eq!(color_for(9), "#ffa657");
        assert_eq!(color_for(10), color_for(0));
    }

    #[test]
    fn test_style_runs_orders_by_label() {
        let runs = vec![
            run("c", sdk_params("Java", "3.10.0")),
            run("none", json!({"impl": {"language": "Java"}})),
            run("a", sdk_params("Java", "3.2.0")),
            run("b", sdk_params("Java", "3.2.0-SNAPSHOT")),
        ];

        let (ordered, styles) = style_runs(runs, &HorizontalAxis::sdk_version()).unwrap();

        let ids: Vec<&str> = ordered.iter().map(|run| run.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "none"]);
        let labels: Vec<&str> = styles.iter().map(|style| style.label.as_str()).collect();
        assert_eq!(labels, vec!["3.2.0", "3.2.0-SNAPSHOT", "3.10.0", UNKNOWN_LABEL]);
        assert_eq!(styles[1].color, PALETTE[1]);
    }

    #[test]
    fn test_style_runs_integer_labels() {
        let axis = HorizontalAxis::new("vars.threads", ResultType::Integer);
        let runs = vec![
            run("many", json!({"vars": {"threads": 64}})),
            run("few", json!({"vars": {"threads": 8}})),
        ];
        let (ordered, _) = style_runs(runs, &axis).unwrap();
        assert_eq!(ordered[0].id, "few");

        let bad = vec![run("x", json!({"vars": {"threads": "lots"}}))];
        assert!(style_runs(bad, &axis).unwrap_err().is_config());
    }

    #[test]
    fn test_requested_event_types() {
        assert_eq!(requested_event_types(&[]), None);
        assert_eq!(
            requested_event_types(&[
                AnnotationRequest::RunEvents {
                    event_types: vec!["failover".to_string()]
                },
                AnnotationRequest::RunEvents {
                    event_types: vec!["failover".to_string(), "rebalance".to_string()]
                },
            ]),
            Some(vec!["failover".to_string(), "rebalance".to_string()])
        );
        assert_eq!(
            requested_event_types(&[
                AnnotationRequest::RunEvents {
                    event_types: vec!["failover".to_string()]
                },
                AnnotationRequest::RunEvents { event_types: vec![] },
            ]),
            Some(vec![])
        );
    }

    #[test]
    fn test_validate_axes() {
        assert!(validate_axes(&[VerticalAxis::errors(), VerticalAxis::metric("processCpu")]).is_ok());
        assert!(validate_axes(&[VerticalAxis::buckets("latency")])
            .unwrap_err()
            .is_config());
    }

    #[tokio::test]
    async fn test_build_one_series_per_run_and_axis() {
        let older = record("old", sdk_params("Java", "3.0.5"), &[100.0, 120.0, 140.0]);
        let newer = record("new", sdk_params("Java", "3.0.6"), &[90.0, 95.0, 100.0]);
        let (_dir, store) = store_with(&[newer.clone(), older.clone()]);

        let mut request = line_request(vec![
            VerticalAxis::buckets("duration_average_us"),
            VerticalAxis::Errors {
                axis_id: "errors".to_string(),
            },
        ]);
        request.trimming_seconds = 10;

        let chart = build(&store, &request, vec![newer.run, older.run]).await.unwrap();

        let ids: Vec<&str> = chart.runs.iter().map(|run| run.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);
        assert_eq!(chart.series.len(), 4);

        let first = &chart.series[0];
        assert_eq!(first.run_id, "old");
        assert_eq!(first.axis_id, "y");
        assert_eq!(first.label, "3.0.5");
        assert_eq!(first.color, PALETTE[0]);
        let values: Vec<f64> = first.points.iter().map(|point| point.value).collect();
        assert_eq!(values, vec![120.0, 140.0]);

        let errors = &chart.series[2];
        assert_eq!(errors.axis_id, "errors");
        assert_eq!(errors.run_id, "old");
        assert!(errors.points.iter().all(|point| point.value == 1.0));
        assert!(chart.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_metric_without_samples_has_no_series() {
        let sampled = record("sampled", sdk_params("Go", "2.7.0"), &[50.0]);
        let mut bare = record("bare", sdk_params("Go", "2.8.0"), &[60.0]);
        bare.metrics.clear();
        let (_dir, store) = store_with(&[sampled.clone(), bare.clone()]);

        let request = line_request(vec![VerticalAxis::metric("processCpu")]);
        let chart = build(&store, &request, vec![sampled.run, bare.run]).await.unwrap();

        assert_eq!(chart.runs.len(), 2);
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].run_id, "sampled");
    }

    #[tokio::test]
    async fn test_metrics_all_one_series_per_key() {
        let sampled = record("sampled", sdk_params("Go", "2.7.0"), &[50.0, 70.0]);
        let (_dir, store) = store_with(&[sampled.clone()]);

        let request = line_request(vec![VerticalAxis::MetricsAll {
            axis_id: "metrics".to_string(),
        }]);
        let chart = build(&store, &request, vec![sampled.run]).await.unwrap();

        let labels: Vec<&str> = chart.series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["2.7.0 processCpu", "2.7.0 threadCount"]);
    }

    #[tokio::test]
    async fn test_annotations_are_staggered() {
        let mut annotated = record("run-1", sdk_params("Java", "3.0.6"), &[100.0, 100.0]);
        annotated.events = (0..5)
            .map(|i| event(i * 5, "failover", if i == 0 { Some("Node down") } else { None }))
            .collect();
        annotated.events.push(event(30, "rebalance", None));
        let (_dir, store) = store_with(&[annotated.clone()]);

        let mut request = line_request(vec![VerticalAxis::buckets("operations_total")]);
        request.annotations = vec![AnnotationRequest::RunEvents {
            event_types: vec!["failover".to_string()],
        }];
        let chart = build(&store, &request, vec![annotated.run]).await.unwrap();

        assert_eq!(chart.annotations.len(), 5);
        let first = &chart.annotations[0];
        assert_eq!(first.id, "run-1-event-0");
        assert_eq!(first.label, "Node down");
        assert_eq!(first.offset_seconds, 0);
        assert_eq!(chart.annotations[1].label, "failover");
        let offsets: Vec<i32> = chart.annotations.iter().map(|a| a.y_offset).collect();
        assert_eq!(offsets, vec![0, 20, 40, 60, 0]);
        assert_eq!(chart.annotations[4].offset_seconds, 20);
    }

    #[tokio::test]
    async fn test_empty_run_list() {
        let (_dir, store) = store_with(&[]);
        let request = line_request(vec![VerticalAxis::buckets("duration_p99_us")]);
        let chart = build(&store, &request, vec![]).await.unwrap();
        assert!(chart.runs.is_empty());
        assert!(chart.series.is_empty());
    }
}
