//! Fixtures shared by the builder and engine tests

use crate::data::{Bucket, MetricSample, Run, RunEvent, RunParams, RunRecord};
use crate::store::SqliteRunStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn open_store() -> (TempDir, SqliteRunStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteRunStore::open(dir.path().join("runs.db"), 4).unwrap();
    store.init_schema().unwrap();
    (dir, store)
}

/// A run with one bucket and one metric sample per entry of `averages`, 10s apart
pub fn record(id: &str, params: Value, averages: &[f64]) -> RunRecord {
    let buckets = averages
        .iter()
        .enumerate()
        .map(|(i, average)| {
            let offset = i as i64 * 10;
            Bucket {
                time_offset_secs: offset,
                datetime: start() + Duration::seconds(offset),
                operations_total: 100,
                operations_success: 99,
                operations_failed: 1,
                duration_min_us: Some(average / 2.0),
                duration_max_us: Some(average * 2.0),
                duration_average_us: Some(*average),
                duration_p50_us: Some(*average),
                duration_p95_us: Some(average * 1.5),
                duration_p99_us: Some(average * 2.0),
                errors: object(json!({"Timeout": 1})),
            }
        })
        .collect();

    let metrics = averages
        .iter()
        .enumerate()
        .map(|(i, average)| MetricSample {
            time_offset_secs: i as i64 * 10,
            initiated: start() + Duration::seconds(i as i64 * 10),
            metrics: object(json!({"processCpu": average / 10.0, "threadCount": 12})),
        })
        .collect();

    RunRecord {
        run: Run {
            id: id.to_string(),
            datetime: start(),
            params: RunParams::from(params),
        },
        buckets,
        metrics,
        events: vec![],
    }
}

pub fn sdk_params(language: &str, version: &str) -> Value {
    json!({
        "cluster": {"version": "7.2.0", "nodes": 3},
        "impl": {"language": language, "version": version},
        "workload": {"operations": "get"},
        "vars": {"threads": 8}
    })
}

pub fn event(offset: i64, event_type: &str, description: Option<&str>) -> RunEvent {
    RunEvent {
        datetime: start() + Duration::seconds(offset),
        event_type: event_type.to_string(),
        description: description.map(str::to_string),
        params: Map::new(),
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
