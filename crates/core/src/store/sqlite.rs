//! SQLite run store
//!
//! Run params, error counts, metrics and event params are stored as JSON text
//! and queried with SQLite's JSON1 functions. Connections come from an `r2d2`
//! pool; each query checks one out for its own duration only.

use super::{AggregateQuery, RunStore, SeriesWindow};
use crate::containment::CompiledFilter;
use crate::data::{
    BarResult, Run, RunEvent, RunParams, RunRecord, SdkInfo, SeriesPoint, CLUSTER_VERSION_PATH,
    SDK_LANGUAGE_PATH, SDK_VERSION_PATH,
};
use crate::error::{Error, Result};
use crate::field_path;
use crate::query::BucketColumn;
use crate::version;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, OptionalExtension, Params, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

/// Separator for run ids collected with `group_concat`
const ID_SEPARATOR: char = '\u{1f}';

/// `(run_id, label)` rows of the JSON array bound as `?1` in aggregate queries
///
/// Binding the whole list as one parameter keeps large run sets clear of
/// SQLite's host parameter limit.
const RUN_LABELS: &str = "select json_extract(value, '$[0]') as run_id,
           json_extract(value, '$[1]') as label
    from json_each(?1)";

pub const SQL_SCHEMA: [&str; 7] = [
    "create table if not exists runs (
    id text primary key,
    datetime text not null,
    params text not null
);",
    "create table if not exists buckets (
    run_id text not null references runs (id),
    time_offset_secs integer not null,
    datetime text not null,
    operations_total integer not null default 0,
    operations_success integer not null default 0,
    operations_failed integer not null default 0,
    duration_min_us real,
    duration_max_us real,
    duration_average_us real,
    duration_p50_us real,
    duration_p95_us real,
    duration_p99_us real,
    errors text
);",
    "create index if not exists buckets_run_offset on buckets (run_id, time_offset_secs);",
    "create table if not exists metrics (
    run_id text not null references runs (id),
    time_offset_secs integer not null,
    initiated text not null,
    metrics text not null
);",
    "create index if not exists metrics_run_offset on metrics (run_id, time_offset_secs);",
    "create table if not exists run_events (
    run_id text not null references runs (id),
    datetime text not null,
    event_type text not null,
    description text,
    params text
);",
    "create index if not exists run_events_run on run_events (run_id, datetime);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();

/// Log a failed query with its context and wrap it
fn store_error(context: &str, source: rusqlite::Error) -> Error {
    error!(context = context, error = ?source, "Store query failed: {source}");
    Error::StoreError {
        context: context.to_string(),
        source,
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        datetime: row.get(1)?,
        params: json_column::<RunParams>(row, 2)?,
    })
}

fn bar_result_from_row(row: &Row<'_>) -> rusqlite::Result<Option<BarResult>> {
    let label: String = row.get(0)?;
    let Some(value) = row.get::<_, Option<f64>>(1)? else {
        return Ok(None);
    };
    let ids: String = row.get(2)?;
    let mut run_ids: Vec<String> = ids.split(ID_SEPARATOR).map(str::to_string).collect();
    run_ids.sort();

    Ok(Some(BarResult {
        label,
        value,
        run_ids,
    }))
}

fn point_from_row(run_id: &str) -> impl Fn(&Row<'_>) -> rusqlite::Result<SeriesPoint> + '_ {
    move |row| {
        Ok(SeriesPoint {
            offset_seconds: row.get(0)?,
            wall_clock_time: row.get(1)?,
            value: row.get(2)?,
            run_id: run_id.to_string(),
        })
    }
}

/// SQLite implementation of [`RunStore`]
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: Pool<SqliteConnectionManager>,
}

impl fmt::Debug for SqliteRunStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pool.state();
        f.debug_struct("SqliteRunStore")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl SqliteRunStore {
    /// Open (or create) a database file behind a pool of at most `max_pool_size` connections
    pub fn open(path: impl AsRef<Path>, max_pool_size: u32) -> Result<Self> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path).with_init(|connection| {
            connection.execute_batch("pragma foreign_keys = on; pragma busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(max_pool_size).build(manager)?;

        info!(path = %path.display(), max_pool_size, "Opened run store");

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run a query and map every row
    fn query_rows<T, P, F>(&self, context: &str, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let connection = self.connection()?;
        debug!(context = context, sql = sql, "Executing store query");

        let result = (|| -> rusqlite::Result<Vec<T>> {
            let mut statement = connection.prepare_cached(sql)?;
            let rows = statement.query_map(params, map)?;
            let collected = rows.collect::<rusqlite::Result<Vec<T>>>();
            collected
        })();

        result.map_err(|source| store_error(context, source))
    }

    /// Apply the schema, table by table
    pub fn init_schema(&self) -> Result<()> {
        let connection = self.connection()?;

        for (index, table) in SQL_SCHEMA.iter().enumerate() {
            let counter = index + 1;
            match connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(source) => {
                    error!(table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER})");
                    return Err(store_error("apply schema", source));
                }
            }
        }

        info!("Run store schema ready");
        Ok(())
    }

    /// Store a run with its buckets, metrics and events in one transaction
    pub fn insert_run(&self, record: &RunRecord) -> Result<()> {
        let run = &record.run;
        let params_json = serde_json::to_string(&run.params)?;
        let bucket_errors = record
            .buckets
            .iter()
            .map(|bucket| {
                if bucket.errors.is_empty() {
                    Ok(None)
                } else {
                    serde_json::to_string(&bucket.errors).map(Some)
                }
            })
            .collect::<serde_json::Result<Vec<_>>>()?;
        let metrics_json = record
            .metrics
            .iter()
            .map(|sample| serde_json::to_string(&sample.metrics))
            .collect::<serde_json::Result<Vec<_>>>()?;
        let event_params = record
            .events
            .iter()
            .map(|event| serde_json::to_string(&event.params))
            .collect::<serde_json::Result<Vec<_>>>()?;

        let mut connection = self.connection()?;
        let result = (|| -> rusqlite::Result<()> {
            let tx = connection.transaction()?;

            tx.execute(
                "insert into runs (id, datetime, params) values (?1, ?2, ?3)",
                params![run.id, run.datetime, params_json],
            )?;

            {
                let mut statement = tx.prepare_cached(
                    "insert into buckets
                    (run_id, time_offset_secs, datetime, operations_total, operations_success,
                     operations_failed, duration_min_us, duration_max_us, duration_average_us,
                     duration_p50_us, duration_p95_us, duration_p99_us, errors)
                    values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                )?;
                for (bucket, errors) in record.buckets.iter().zip(&bucket_errors) {
                    statement.execute(params![
                        run.id,
                        bucket.time_offset_secs,
                        bucket.datetime,
                        bucket.operations_total,
                        bucket.operations_success,
                        bucket.operations_failed,
                        bucket.duration_min_us,
                        bucket.duration_max_us,
                        bucket.duration_average_us,
                        bucket.duration_p50_us,
                        bucket.duration_p95_us,
                        bucket.duration_p99_us,
                        errors,
                    ])?;
                }

                let mut statement = tx.prepare_cached(
                    "insert into metrics (run_id, time_offset_secs, initiated, metrics)
                    values (?1, ?2, ?3, ?4)",
                )?;
                for (sample, metrics) in record.metrics.iter().zip(&metrics_json) {
                    statement.execute(params![
                        run.id,
                        sample.time_offset_secs,
                        sample.initiated,
                        metrics
                    ])?;
                }

                let mut statement = tx.prepare_cached(
                    "insert into run_events (run_id, datetime, event_type, description, params)
                    values (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (event, params) in record.events.iter().zip(&event_params) {
                    statement.execute(params![
                        run.id,
                        event.datetime,
                        event.event_type,
                        event.description,
                        params
                    ])?;
                }
            }

            tx.commit()
        })();

        result.map_err(|source| store_error(&format!("insert run {}", run.id), source))?;

        debug!(
            id = %run.id,
            buckets = record.buckets.len(),
            metrics = record.metrics.len(),
            events = record.events.len(),
            "Inserted run"
        );

        Ok(())
    }

    /// Store several runs, returning how many were written
    pub fn insert_runs<'a, I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a RunRecord>,
    {
        let mut counter = 0;
        for record in records {
            self.insert_run(record)?;
            counter += 1;
        }

        info!("Stored {counter} runs");
        Ok(counter)
    }

    fn series(
        &self,
        context: &str,
        sql: &str,
        run_id: &str,
        window: &SeriesWindow,
        extra: Option<&str>,
    ) -> Result<Vec<SeriesPoint>> {
        let mut values = vec![
            SqlValue::Text(run_id.to_string()),
            SqlValue::Integer(window.trimming_seconds),
            SqlValue::Integer(window.width()),
        ];
        if let Some(extra) = extra {
            values.push(SqlValue::Text(extra.to_string()));
        }

        self.query_rows(context, sql, params_from_iter(values), point_from_row(run_id))
    }
}

impl RunStore for SqliteRunStore {
    fn find_runs(&self, filter: &CompiledFilter) -> Result<Vec<Run>> {
        let mut sql = String::from("select id, datetime, params from runs");
        let mut values = Vec::with_capacity(filter.clauses().len() * 2);

        for (index, clause) in filter.clauses().iter().enumerate() {
            sql.push_str(if index == 0 { " where " } else { " and " });
            // arrays may match the scalar by element, so they pass to the residual check
            sql.push_str(&format!(
                "(json_extract(params, ?{path}) = json_extract(?{value}, '$') \
                 or json_type(params, ?{path}) = 'array')",
                path = index * 2 + 1,
                value = index * 2 + 2
            ));
            values.push(SqlValue::Text(clause.json_path.clone()));
            values.push(SqlValue::Text(clause.value_json.clone()));
        }
        sql.push_str(" order by datetime, id");

        let mut runs = self.query_rows("find runs", &sql, params_from_iter(values), run_from_row)?;
        let candidates = runs.len();
        runs.retain(|run| filter.contains(run));

        debug!(candidates, matched = runs.len(), "Containment query returned runs");
        Ok(runs)
    }

    fn run(&self, run_id: &str) -> Result<Option<Run>> {
        let connection = self.connection()?;
        connection
            .prepare_cached("select id, datetime, params from runs where id = ?1")
            .and_then(|mut statement| statement.query_row(params![run_id], run_from_row).optional())
            .map_err(|source| store_error(&format!("load run {}", run_id), source))
    }

    fn aggregate_buckets(
        &self,
        query: &AggregateQuery<'_>,
        column: BucketColumn,
    ) -> Result<Vec<BarResult>> {
        if query.run_labels.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "select label, {policy}(run_value), group_concat(run_id, char(31))
            from (
                select g.run_id as run_id, g.label as label, {algorithm}(s.{column}) as run_value
                from ({run_labels}) g
                join buckets s on s.run_id = g.run_id
                where s.time_offset_secs >= ?2
                  and s.{column} is not null
                group by g.run_id
            )
            group by label",
            policy = query.merge_policy.sql_function(),
            algorithm = query.merge_algorithm.sql_function(),
            run_labels = RUN_LABELS,
            column = column.as_str(),
        );

        let rows = self.query_rows(
            "aggregate buckets",
            &sql,
            params![serde_json::to_string(query.run_labels)?, query.trimming_seconds],
            bar_result_from_row,
        )?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn aggregate_metric(&self, query: &AggregateQuery<'_>, metric: &str) -> Result<Vec<BarResult>> {
        if query.run_labels.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "select label, {policy}(run_value), group_concat(run_id, char(31))
            from (
                select g.run_id as run_id, g.label as label,
                       {algorithm}(json_extract(s.metrics, ?3)) as run_value
                from ({run_labels}) g
                join metrics s on s.run_id = g.run_id
                where s.time_offset_secs >= ?2
                  and json_type(s.metrics, ?3) in ('integer', 'real')
                group by g.run_id
            )
            group by label",
            policy = query.merge_policy.sql_function(),
            algorithm = query.merge_algorithm.sql_function(),
            run_labels = RUN_LABELS,
        );

        let rows = self.query_rows(
            "aggregate metric",
            &sql,
            params![
                serde_json::to_string(query.run_labels)?,
                query.trimming_seconds,
                field_path::to_json_path(metric)?
            ],
            bar_result_from_row,
        )?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn bucket_series(
        &self,
        run_id: &str,
        column: BucketColumn,
        window: &SeriesWindow,
    ) -> Result<Vec<SeriesPoint>> {
        let sql = format!(
            "select (time_offset_secs / ?3) * ?3 as bucket_offset, min(datetime), {merge}({column})
            from buckets
            where run_id = ?1 and time_offset_secs >= ?2 and {column} is not null
            group by bucket_offset
            order by bucket_offset",
            merge = window.merge.sql_function(),
            column = column.as_str(),
        );

        self.series("bucket series", &sql, run_id, window, None)
    }

    fn metric_series(
        &self,
        run_id: &str,
        metric: &str,
        window: &SeriesWindow,
    ) -> Result<Vec<SeriesPoint>> {
        let sql = format!(
            "select (time_offset_secs / ?3) * ?3 as bucket_offset, min(initiated),
                    {merge}(json_extract(metrics, ?4))
            from metrics
            where run_id = ?1 and time_offset_secs >= ?2
              and json_type(metrics, ?4) in ('integer', 'real')
            group by bucket_offset
            order by bucket_offset",
            merge = window.merge.sql_function(),
        );

        let path = field_path::to_json_path(metric)?;
        self.series("metric series", &sql, run_id, window, Some(&path))
    }

    fn metric_keys(&self, run_id: &str) -> Result<Vec<String>> {
        self.query_rows(
            "metric keys",
            "select distinct j.key
            from metrics m, json_each(m.metrics) j
            where m.run_id = ?1 and j.type in ('integer', 'real')
            order by j.key",
            params![run_id],
            |row| row.get(0),
        )
    }

    fn error_series(&self, run_id: &str, window: &SeriesWindow) -> Result<Vec<SeriesPoint>> {
        let sql = format!(
            "select (b.time_offset_secs / ?3) * ?3 as bucket_offset, min(b.datetime),
                    {merge}((select coalesce(sum(e.value), 0)
                             from json_each(coalesce(b.errors, '{{}}')) e))
            from buckets b
            where b.run_id = ?1 and b.time_offset_secs >= ?2
            group by bucket_offset
            order by bucket_offset",
            merge = window.merge.sql_function(),
        );

        self.series("error series", &sql, run_id, window, None)
    }

    fn first_bucket_time(&self, run_id: &str) -> Result<Option<DateTime<Utc>>> {
        let connection = self.connection()?;
        connection
            .prepare_cached("select min(datetime) from buckets where run_id = ?1")
            .and_then(|mut statement| {
                statement.query_row(params![run_id], |row| row.get::<_, Option<DateTime<Utc>>>(0))
            })
            .map_err(|source| store_error(&format!("first bucket of run {}", run_id), source))
    }

    fn run_events(&self, run_id: &str, event_types: &[String]) -> Result<Vec<RunEvent>> {
        let events = self.query_rows(
            "run events",
            "select datetime, event_type, description, params
            from run_events
            where run_id = ?1
            order by datetime, rowid",
            params![run_id],
            |row| {
                let params: Option<String> = row.get(3)?;
                let params = match params {
                    Some(text) => serde_json::from_str(&text).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?,
                    None => Default::default(),
                };
                Ok(RunEvent {
                    datetime: row.get(0)?,
                    event_type: row.get(1)?,
                    description: row.get(2)?,
                    params,
                })
            },
        )?;

        Ok(events
            .into_iter()
            .filter(|event| event_types.is_empty() || event_types.contains(&event.event_type))
            .collect())
    }

    fn cluster_versions(&self) -> Result<Vec<String>> {
        let mut versions: Vec<String> = self.query_rows(
            "cluster versions",
            "select distinct json_extract(params, ?1)
            from runs
            where json_type(params, ?1) = 'text'",
            params![field_path::to_json_path(CLUSTER_VERSION_PATH)?],
            |row| row.get(0),
        )?;

        versions.sort_by(|a, b| version::compare(a, b));
        Ok(versions)
    }

    fn sdks(&self) -> Result<Vec<SdkInfo>> {
        let pairs: Vec<(String, String)> = self.query_rows(
            "sdk versions",
            "select distinct json_extract(params, ?1), json_extract(params, ?2)
            from runs
            where json_type(params, ?1) = 'text' and json_type(params, ?2) = 'text'",
            params![
                field_path::to_json_path(SDK_LANGUAGE_PATH)?,
                field_path::to_json_path(SDK_VERSION_PATH)?
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut by_language: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (language, version) in pairs {
            by_language.entry(language).or_default().push(version);
        }

        Ok(by_language
            .into_iter()
            .map(|(language, mut versions)| {
                versions.sort_by(|a, b| version::compare(a, b));
                SdkInfo { language, versions }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containment;
    use crate::data::{Bucket, MetricSample};
    use crate::query::{Aggregation, ComparisonFilter};
    use chrono::{Duration, TimeZone};
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn make_bucket(offset: i64, average: f64, errors: Value) -> Bucket {
        Bucket {
            time_offset_secs: offset,
            datetime: start() + Duration::seconds(offset),
            operations_total: 100,
            operations_success: 98,
            operations_failed: 2,
            duration_min_us: Some(average / 2.0),
            duration_max_us: Some(average * 2.0),
            duration_average_us: Some(average),
            duration_p50_us: Some(average),
            duration_p95_us: Some(average * 1.5),
            duration_p99_us: Some(average * 1.8),
            errors: object(errors),
        }
    }

    fn make_record(id: &str, language: &str, version: &str, averages: &[f64]) -> RunRecord {
        RunRecord {
            run: Run {
                id: id.to_string(),
                datetime: start(),
                params: RunParams::from(json!({
                    "cluster": {"version": "7.2.0"},
                    "impl": {"language": language, "version": version},
                    "vars": {"threads": 4}
                })),
            },
            buckets: averages
                .iter()
                .enumerate()
                .map(|(i, avg)| make_bucket(i as i64 * 10, *avg, json!({"Timeout": i, "Ambiguous": 1})))
                .collect(),
            metrics: averages
                .iter()
                .enumerate()
                .map(|(i, avg)| MetricSample {
                    time_offset_secs: i as i64 * 10,
                    initiated: start() + Duration::seconds(i as i64 * 10),
                    metrics: object(json!({"processCpu": avg / 10.0, "gc": "g1"})),
                })
                .collect(),
            events: vec![],
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(id, label)| (id.to_string(), label.to_string()))
            .collect()
    }

    fn open_store() -> (TempDir, SqliteRunStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteRunStore::open(dir.path().join("runs.db"), 4).unwrap();
        store.init_schema().unwrap();
        (dir, store)
    }

    #[test]
    fn test_find_runs_pushes_down_scalars() {
        let (_dir, store) = open_store();
        store
            .insert_runs(&[
                make_record("java-1", "Java", "3.0.5", &[100.0]),
                make_record("go-1", "Go", "2.7.0", &[50.0]),
            ])
            .unwrap();

        let filter = containment::compile(&ComparisonFilter::from(
            json!({"impl": {"language": "Java"}, "vars": {"threads": 4}}),
        ))
        .unwrap();
        let runs = store.find_runs(&filter).unwrap();

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "java-1");
        assert_eq!(runs[0].datetime, start());
        assert_eq!(runs[0].params.sdk_version(), Some("3.0.5"));
    }

    #[test]
    fn test_find_runs_does_not_conflate_json_types() {
        let (_dir, store) = open_store();
        let mut durable = make_record("durable", "Java", "3.0.5", &[]);
        durable.run.params = RunParams::from(json!({
            "vars": {"durable": true},
            "workload": {"ops": ["get"]}
        }));
        let mut numeric = make_record("numeric", "Java", "3.0.5", &[]);
        numeric.run.params = RunParams::from(json!({
            "vars": {"durable": 1},
            "workload": {"ops": "[\"get\"]"}
        }));
        store.insert_runs(&[durable, numeric]).unwrap();

        let find = |filter: Value| -> Vec<String> {
            let compiled = containment::compile(&ComparisonFilter::from(filter)).unwrap();
            store.find_runs(&compiled).unwrap().into_iter().map(|run| run.id).collect()
        };

        assert_eq!(find(json!({"vars": {"durable": 1}})), vec!["numeric"]);
        assert_eq!(find(json!({"vars": {"durable": true}})), vec!["durable"]);
        assert_eq!(find(json!({"workload": {"ops": "[\"get\"]"}})), vec!["numeric"]);
        // a scalar still matches an array holding it
        assert_eq!(find(json!({"workload": {"ops": "get"}})), vec!["durable"]);
    }

    #[test]
    fn test_run_lookup() {
        let (_dir, store) = open_store();
        store.insert_run(&make_record("java-1", "Java", "3.0.5", &[])).unwrap();

        assert!(store.run("java-1").unwrap().is_some());
        assert!(store.run("missing").unwrap().is_none());
    }

    #[test]
    fn test_aggregate_buckets_with_trimming() {
        let (_dir, store) = open_store();
        store
            .insert_runs(&[
                // the first bucket (offset 0) is warm-up
                make_record("a", "Java", "3.0.5", &[1000.0, 100.0, 100.0]),
                make_record("b", "Java", "3.0.6", &[1000.0, 80.0, 100.0]),
            ])
            .unwrap();

        let run_labels = labels(&[("a", "3.0.5"), ("b", "3.0.6")]);
        let query = AggregateQuery {
            run_labels: &run_labels,
            merge_policy: Aggregation::Average,
            merge_algorithm: Aggregation::Average,
            trimming_seconds: 10,
        };

        let mut results = store
            .aggregate_buckets(&query, BucketColumn::DurationAverageUs)
            .unwrap();
        results.sort_by(|a, b| a.label.cmp(&b.label));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "3.0.5");
        assert_eq!(results[0].value, 100.0);
        assert_eq!(results[1].value, 90.0);
        assert_eq!(results[1].run_ids, vec!["b".to_string()]);
    }

    #[test]
    fn test_aggregate_beyond_parameter_limit() {
        let (_dir, store) = open_store();
        store
            .insert_runs(&[
                make_record("a", "Java", "3.0.5", &[100.0]),
                make_record("b", "Java", "3.0.6", &[50.0]),
            ])
            .unwrap();

        // more ids than SQLite accepts as separate host parameters
        let mut run_labels: Vec<(String, String)> = (0..40_000)
            .map(|i| (format!("absent-{}", i), "3.0.6".to_string()))
            .collect();
        run_labels.extend(labels(&[("a", "3.0.5"), ("b", "3.0.6")]));
        let query = AggregateQuery {
            run_labels: &run_labels,
            merge_policy: Aggregation::Average,
            merge_algorithm: Aggregation::Average,
            trimming_seconds: 0,
        };

        let mut results = store
            .aggregate_buckets(&query, BucketColumn::DurationAverageUs)
            .unwrap();
        results.sort_by(|a, b| a.label.cmp(&b.label));
        let groups: Vec<(&str, f64)> = results.iter().map(|r| (r.label.as_str(), r.value)).collect();
        assert_eq!(groups, vec![("3.0.5", 100.0), ("3.0.6", 50.0)]);

        let cpu = store.aggregate_metric(&query, "processCpu").unwrap();
        assert_eq!(cpu.len(), 2);
    }

    #[test]
    fn test_aggregate_metric() {
        let (_dir, store) = open_store();
        store
            .insert_runs(&[
                make_record("a", "Java", "3.0.5", &[100.0, 300.0]),
                make_record("b", "Java", "3.0.5", &[200.0, 200.0]),
            ])
            .unwrap();

        let run_labels = labels(&[("a", "Java"), ("b", "Java")]);
        let query = AggregateQuery {
            run_labels: &run_labels,
            merge_policy: Aggregation::Sum,
            merge_algorithm: Aggregation::Maximum,
            trimming_seconds: 0,
        };

        let results = store.aggregate_metric(&query, "processCpu").unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "Java");
        // max per run: 30 and 20
        assert!((results[0].value - 50.0).abs() < 1e-9);
        assert_eq!(results[0].run_ids, vec!["a".to_string(), "b".to_string()]);

        // non-numeric metric values are skipped entirely
        assert!(store.aggregate_metric(&query, "gc").unwrap().is_empty());
    }

    #[test]
    fn test_series_queries() {
        let (_dir, store) = open_store();
        store
            .insert_run(&make_record("a", "Java", "3.0.5", &[100.0, 200.0, 300.0, 400.0]))
            .unwrap();

        let window = SeriesWindow {
            trimming_seconds: 10,
            ..SeriesWindow::default()
        };
        let points = store
            .bucket_series("a", BucketColumn::DurationAverageUs, &window)
            .unwrap();
        let offsets: Vec<i64> = points.iter().map(|p| p.offset_seconds).collect();
        assert_eq!(offsets, vec![10, 20, 30]);
        assert_eq!(points[0].value, 200.0);
        assert_eq!(points[0].wall_clock_time, start() + Duration::seconds(10));
        assert_eq!(points[0].run_id, "a");

        let bucketised = SeriesWindow {
            trimming_seconds: 0,
            bucketise_seconds: Some(20),
            merge: Aggregation::Maximum,
        };
        let points = store
            .bucket_series("a", BucketColumn::DurationAverageUs, &bucketised)
            .unwrap();
        let values: Vec<(i64, f64)> = points.iter().map(|p| (p.offset_seconds, p.value)).collect();
        assert_eq!(values, vec![(0, 200.0), (20, 400.0)]);

        let errors = store.error_series("a", &SeriesWindow::default()).unwrap();
        let totals: Vec<f64> = errors.iter().map(|p| p.value).collect();
        assert_eq!(totals, vec![1.0, 2.0, 3.0, 4.0]);

        let cpu = store
            .metric_series("a", "processCpu", &SeriesWindow::default())
            .unwrap();
        assert_eq!(cpu.len(), 4);
        assert!((cpu[3].value - 40.0).abs() < 1e-9);

        assert!(store.metric_series("a", "gc", &SeriesWindow::default()).unwrap().is_empty());
        assert_eq!(store.metric_keys("a").unwrap(), vec!["processCpu".to_string()]);
        assert_eq!(store.first_bucket_time("a").unwrap(), Some(start()));
        assert_eq!(store.first_bucket_time("missing").unwrap(), None);
    }

    #[test]
    fn test_run_events_filtering() {
        let (_dir, store) = open_store();
        let mut record = make_record("a", "Java", "3.0.5", &[100.0]);
        record.events = vec![
            RunEvent {
                datetime: start() + Duration::seconds(30),
                event_type: "failover".to_string(),
                description: Some("node 2 failed over".to_string()),
                params: Map::new(),
            },
            RunEvent {
                datetime: start() + Duration::seconds(5),
                event_type: "rebalance".to_string(),
                description: None,
                params: object(json!({"nodes": 3})),
            },
        ];
        store.insert_run(&record).unwrap();

        let all = store.run_events("a", &[]).unwrap();
        let types: Vec<&str> = all.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["rebalance", "failover"]);
        assert_eq!(all[0].params.get("nodes"), Some(&json!(3)));

        let failovers = store.run_events("a", &["failover".to_string()]).unwrap();
        assert_eq!(failovers.len(), 1);
    }

    #[test]
    fn test_reference_lists() {
        let (_dir, store) = open_store();
        store
            .insert_runs(&[
                make_record("a", "Java", "3.0.10", &[]),
                make_record("b", "Java", "3.0.9", &[]),
                make_record("c", "Go", "2.7.0", &[]),
            ])
            .unwrap();

        assert_eq!(store.cluster_versions().unwrap(), vec!["7.2.0".to_string()]);
        assert_eq!(
            store.sdks().unwrap(),
            vec![
                SdkInfo {
                    language: "Go".to_string(),
                    versions: vec!["2.7.0".to_string()]
                },
                SdkInfo {
                    language: "Java".to_string(),
                    versions: vec!["3.0.9".to_string(), "3.0.10".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_run_is_a_store_error() {
        let (_dir, store) = open_store();
        let record = make_record("a", "Java", "3.0.5", &[100.0]);
        store.insert_run(&record).unwrap();

        let err = store.insert_run(&record).unwrap_err();
        assert!(matches!(err, Error::StoreError { .. }));
        // the failed transaction left the first copy intact
        let points = store
            .bucket_series("a", BucketColumn::DurationAverageUs, &SeriesWindow::default())
            .unwrap();
        assert_eq!(points.len(), 1);
    }
}
