//! Compilation of comparison filters into store predicates and exclusion sets
//!
//! A comparison filter is a partial run-params document. Non-null leaves turn
//! into a containment predicate; `null` leaves mean "this key must be absent",
//! which containment cannot express, so they are collected into an exclusion
//! set checked against each candidate run after the query returns.
//!
//! Scalar leaves are also pushed down to the store as [`LeafClause`]s. Those
//! only narrow the candidate set: SQL equality does not tell `1` from `true`,
//! so every candidate is still checked with [`CompiledFilter::contains`].

use crate::data::Run;
use crate::error::Result;
use crate::field_path;
use crate::query::ComparisonFilter;
use serde_json::{Map, Value};
use tracing::debug;

/// One scalar leaf that the store can check with a JSON path lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LeafClause {
    /// Dotted path, e.g. `impl.language`
    pub path: String,
    /// SQLite JSON path, e.g. `$."impl"."language"`
    pub json_path: String,
    /// Expected value, serialized as JSON
    pub value_json: String,
}

/// A comparison filter split into a containment predicate and an exclusion set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pattern: Map<String, Value>,
    clauses: Vec<LeafClause>,
    exclusions: Vec<String>,
}

/// Compile a comparison filter
///
/// Keys containing `.` are rejected, since paths are dotted.
pub fn compile(filter: &ComparisonFilter) -> Result<CompiledFilter> {
    field_path::check_keys(filter.as_map())?;
    let exclusions = field_path::null_leaf_paths(filter.as_map());
    let pattern = field_path::strip_nulls(filter.as_map());

    let mut clauses = Vec::new();
    for (path, value) in field_path::leaves(&pattern) {
        // arrays and empty objects are only checked application-side
        if matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
            clauses.push(LeafClause {
                json_path: field_path::to_json_path(&path)?,
                value_json: serde_json::to_string(value)?,
                path,
            });
        }
    }

    debug!(
        clauses = clauses.len(),
        exclusions = ?exclusions,
        "Compiled comparison filter"
    );

    Ok(CompiledFilter {
        pattern,
        clauses,
        exclusions,
    })
}

impl CompiledFilter {
    /// A filter matching every run
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// The filter with every `null` leaf removed
    pub fn pattern(&self) -> &Map<String, Value> {
        &self.pattern
    }

    /// Scalar leaves the store may use to narrow its candidates
    pub fn clauses(&self) -> &[LeafClause] {
        &self.clauses
    }

    /// Dotted paths of every `null` leaf
    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// Structural containment of the stripped pattern in the run's params
    pub fn contains(&self, run: &Run) -> bool {
        field_path::contains_object(run.params.as_map(), &self.pattern)
    }

    /// Whether the run has any key the filter requires to be absent
    pub fn is_excluded(&self, run: &Run) -> bool {
        self.exclusions
            .iter()
            .any(|path| field_path::has_path(run.params.as_map(), path))
    }

    /// Drop runs possessing an excluded key
    pub fn apply_exclusions(&self, runs: Vec<Run>) -> Vec<Run> {
        if self.exclusions.is_empty() {
            return runs;
        }

        let before = runs.len();
        let kept: Vec<Run> = runs.into_iter().filter(|run| !self.is_excluded(run)).collect();
        debug!(
            excluded = before - kept.len(),
            kept = kept.len(),
            "Applied exclusion set"
        );
        kept
    }
}
