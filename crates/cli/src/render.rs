//! Plain-text rendering and argument parsing helpers

use perf_dashboard_core::{
    BarChart, ChartResponse, LineChart, Run, RunFilterMode, SdkInfo, VerticalAxis,
};
use std::fmt::Write;

/// Parse `buckets:<column>`, `metric:<name>`, `errors` or `metrics-all`
pub fn parse_axis(arg: &str) -> Result<VerticalAxis, String> {
    let (kind, value) = match arg.split_once(':') {
        Some((kind, value)) => (kind, Some(value)),
        None => (arg, None),
    };

    match (kind, value) {
        ("buckets", Some(column)) if !column.is_empty() => Ok(VerticalAxis::buckets(column)),
        ("metric", Some(metric)) if !metric.is_empty() => Ok(VerticalAxis::metric(metric)),
        ("errors", None) => Ok(VerticalAxis::errors()),
        ("metrics-all" | "metricsAll", None) => Ok(VerticalAxis::MetricsAll {
            axis_id: "y".to_string(),
        }),
        _ => Err(format!(
            "invalid axis '{}', expected buckets:<column>, metric:<name>, errors or metrics-all",
            arg
        )),
    }
}

pub fn parse_mode(mode: &str) -> Result<RunFilterMode, String> {
    serde_json::from_value(serde_json::Value::String(mode.to_string()))
        .map_err(|_| format!("invalid mode '{}', expected all, latest or latest-non-snapshot", mode))
}

pub fn chart(response: &ChartResponse) -> String {
    match response {
        ChartResponse::Bar(chart) => bar_chart(chart),
        ChartResponse::Line(chart) => line_chart(chart),
    }
}

pub fn bar_chart(chart: &BarChart) -> String {
    let mut out = String::new();
    let width = chart.labels.iter().map(String::len).max().unwrap_or(0);

    for ((label, value), run_ids) in chart
        .labels
        .iter()
        .zip(&chart.values)
        .zip(&chart.run_ids_per_label)
    {
        let _ = writeln!(
            out,
            "{:<width$}  {:>12.2}  ({} run{})",
            label,
            value,
            run_ids.len(),
            if run_ids.len() == 1 { "" } else { "s" },
        );
    }

    if chart.labels.is_empty() {
        out.push_str("No matching runs\n");
    }
    out
}

pub fn line_chart(chart: &LineChart) -> String {
    let mut out = String::new();

    for series in &chart.series {
        let values = series.points.iter().map(|point| point.value);
        let min = values.clone().fold(f64::INFINITY, f64::min);
        let max = values.fold(f64::NEG_INFINITY, f64::max);

        let _ = write!(
            out,
            "[{}] {} ({}) {}: {} points",
            series.axis_id,
            series.label,
            series.run_id,
            series.color,
            series.points.len()
        );
        if !series.points.is_empty() {
            let _ = write!(out, ", min {:.2}, max {:.2}", min, max);
        }
        out.push('\n');
    }

    for annotation in &chart.annotations {
        let _ = writeln!(
            out,
            "  @{:>6}s {} ({}): {}",
            annotation.offset_seconds, annotation.run_id, annotation.event_type, annotation.label
        );
    }

    if chart.series.is_empty() {
        out.push_str("No series\n");
    }
    out
}

pub fn runs(runs: &[Run]) -> String {
    let mut out = String::new();
    for run in runs {
        let _ = writeln!(
            out,
            "{}  {}  {} {}",
            run.id,
            run.datetime.format("%Y-%m-%d %H:%M:%S UTC"),
            run.params.sdk_language().unwrap_or("-"),
            run.params.sdk_version().unwrap_or("-"),
        );
    }
    out
}

pub fn reference(cluster_versions: &[String], sdks: &[SdkInfo]) -> String {
    let mut out = String::from("Cluster versions:\n");
    for version in cluster_versions {
        let _ = writeln!(out, "  {}", version);
    }
    out.push_str("SDKs:\n");
    for sdk in sdks {
        let _ = writeln!(out, "  {}: {}", sdk.language, sdk.versions.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_axis() {
        assert_eq!(
            parse_axis("buckets:duration_p95_us").unwrap(),
            VerticalAxis::buckets("duration_p95_us")
        );
        assert_eq!(
            parse_axis("metric:processCpu").unwrap(),
            VerticalAxis::metric("processCpu")
        );
        assert_eq!(parse_axis("errors").unwrap(), VerticalAxis::errors());
        assert_eq!(parse_axis("metrics-all").unwrap().kind(), "metricsAll");
        assert!(parse_axis("buckets:").is_err());
        assert!(parse_axis("errors:all").is_err());
        assert!(parse_axis("latency").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("latest-non-snapshot").unwrap(), RunFilterMode::LatestNonSnapshot);
        assert_eq!(parse_mode("all").unwrap(), RunFilterMode::All);
        assert!(parse_mode("newest").is_err());
    }

    #[test]
    fn test_bar_chart_text() {
        let chart = BarChart {
            runs: vec![],
            labels: vec!["3.0.5".to_string(), "3.0.6".to_string()],
            values: vec![100.0, 95.5],
            run_ids_per_label: vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
            ],
        };

        let text = bar_chart(&chart);
        assert_eq!(
            text,
            "3.0.5        100.00  (1 run)\n3.0.6         95.50  (2 runs)\n"
        );
    }

    #[test]
    fn test_empty_charts() {
        let bar = BarChart {
            runs: vec![],
            labels: vec![],
            values: vec![],
            run_ids_per_label: vec![],
        };
        assert_eq!(bar_chart(&bar), "No matching runs\n");

        let line = LineChart {
            runs: vec![],
            series: vec![],
            annotations: vec![],
        };
        assert_eq!(line_chart(&line), "No series\n");
    }
}
