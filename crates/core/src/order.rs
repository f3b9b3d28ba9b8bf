//! Ordering of bar results and run groupings by the horizontal axis result type
//!
//! `string` labels are not collated against a locale: no collation tables
//! ship with the engine, and chart output must not depend on the host's
//! locale settings. Labels compare Unicode-lowercased first, so `go`, `Java`
//! and `java` interleave the way a reader expects, with a raw byte comparison
//! breaking ties. Accented letters sort by code point after their lowercase
//! form (`zebra` before `Éclair`).

use crate::data::BarResult;
use crate::error::{Error, Result};
use crate::query::ResultType;
use crate::version;
use std::cmp::Ordering;

fn parse_integer(label: &str) -> Result<i64> {
    label.trim().parse::<i64>().map_err(|_| {
        Error::config(format!(
            "Label '{}' is not an integer but the axis result type is 'integer'",
            label
        ))
    })
}

/// Compare two labels under a result type
///
/// `string` compares case-folded first so that `java` and `Java` sit
/// together, then falls back to the raw strings for a total order.
pub fn compare_labels(a: &str, b: &str, result_type: ResultType) -> Result<Ordering> {
    match result_type {
        ResultType::Integer => Ok(parse_integer(a)?.cmp(&parse_integer(b)?)),
        ResultType::String => Ok(a
            .to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))),
        ResultType::VersionSemver => Ok(version::compare(a, b)),
    }
}

/// Stable sort of `items` by the label `key` extracts
///
/// Integer labels are validated up front so an unparseable label is always
/// reported, never silently ordered.
pub fn sort_by_label<T, F>(items: &mut [T], result_type: ResultType, key: F) -> Result<()>
where
    F: Fn(&T) -> &str,
{
    if result_type == ResultType::Integer {
        for item in items.iter() {
            parse_integer(key(item))?;
        }
    }

    items.sort_by(|a, b| compare_labels(key(a), key(b), result_type).unwrap_or(Ordering::Equal));
    Ok(())
}

/// Order bar results by label
pub fn sort_results(mut results: Vec<BarResult>, result_type: ResultType) -> Result<Vec<BarResult>> {
    sort_by_label(&mut results, result_type, |result| result.label.as_str())?;
    Ok(results)
}
