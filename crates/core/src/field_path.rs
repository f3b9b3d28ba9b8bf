//! Dotted field path traversal over arbitrary JSON records
//!
//! Runs carry four nested JSON blobs (`cluster`, `impl`, `workload`, `vars`)
//! whose shape the engine deliberately does not know. Every place that needs
//! to reach into them (grouping keys, exclusion sets, containment) goes
//! through this module, addressing fields with dotted paths such as
//! `impl.version` or `cluster.nodes.memory`.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Split and validate a dotted path
///
/// Segments must be non-empty and may not contain a double quote, since the
/// path is also rendered into SQLite JSON path syntax.
pub fn parse_path(path: &str) -> Result<Vec<&str>> {
    if path.trim().is_empty() {
        return Err(Error::config("Field path cannot be empty"));
    }

    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments {
        if segment.is_empty() || segment.contains('"') {
            return Err(Error::config(format!(
                "Invalid field path '{}': segment '{}' is not addressable",
                path, segment
            )));
        }
    }

    Ok(segments)
}

/// Render a dotted path as a SQLite JSON path (`impl.version` -> `$."impl"."version"`)
pub fn to_json_path(path: &str) -> Result<String> {
    let segments = parse_path(path)?;
    let mut rendered = String::from("$");
    for segment in segments {
        rendered.push_str(".\"");
        rendered.push_str(segment);
        rendered.push('"');
    }
    Ok(rendered)
}

/// Look up the value at `path`, if every intermediate level is an object
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Same as [`get`] but starting from a map
pub fn get_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (first, rest) = match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    };

    let value = map.get(first)?;
    match rest {
        Some(rest) => get(value, rest),
        None => Some(value),
    }
}

/// Whether the key at `path` exists, regardless of its value (an explicit
/// JSON `null` counts as present)
pub fn has_path(map: &Map<String, Value>, path: &str) -> bool {
    get_in(map, path).is_some()
}

/// Remove the key at `path`, returning its previous value
pub fn remove(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => map.remove(path),
        Some((first, rest)) => remove(map.get_mut(first)?.as_object_mut()?, rest),
    }
}

/// Dotted paths of every leaf whose value is `null`
pub fn null_leaf_paths(map: &Map<String, Value>) -> Vec<String> {
    let mut paths = Vec::new();
    collect_null_leaves(map, "", &mut paths);
    paths
}

fn collect_null_leaves(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = join(prefix, key);
        match value {
            Value::Null => out.push(path),
            Value::Object(inner) => collect_null_leaves(inner, &path, out),
            _ => {}
        }
    }
}

/// Copy of `map` with all `null` leaves removed
///
/// Objects that become empty only because their children were stripped are
/// removed as well; objects that were empty to begin with are kept.
pub fn strip_nulls(map: &Map<String, Value>) -> Map<String, Value> {
    let mut stripped = Map::new();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::Object(inner) => {
                let inner_stripped = strip_nulls(inner);
                if !inner_stripped.is_empty() || inner.is_empty() {
                    stripped.insert(key.clone(), Value::Object(inner_stripped));
                }
            }
            other => {
                stripped.insert(key.clone(), other.clone());
            }
        }
    }
    stripped
}

/// Every non-object leaf with its dotted path; arrays count as leaves
pub fn leaves(map: &Map<String, Value>) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    collect_leaves(map, "", &mut out);
    out
}

fn collect_leaves<'a>(map: &'a Map<String, Value>, prefix: &str, out: &mut Vec<(String, &'a Value)>) {
    for (key, value) in map {
        let path = join(prefix, key);
        match value {
            Value::Object(inner) => collect_leaves(inner, &path, out),
            leaf => out.push((path, leaf)),
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Structural containment: is `pattern` a sub-structure of `haystack`?
///
/// Objects match when every pattern key is present in the haystack and its
/// value is contained. Arrays match when every pattern element is contained
/// in at least one haystack element. Scalars must be equal (numbers compare
/// by value, so `3` matches `3.0`).
pub fn contains(haystack: &Value, pattern: &Value) -> bool {
    match (haystack, pattern) {
        (Value::Object(hay), Value::Object(pat)) => pat
            .iter()
            .all(|(key, value)| hay.get(key).is_some_and(|h| contains(h, value))),
        (Value::Array(hay), Value::Array(pat)) => pat
            .iter()
            .all(|p| hay.iter().any(|h| contains(h, p))),
        (Value::Array(hay), scalar) if !scalar.is_object() => {
            hay.iter().any(|h| !h.is_array() && contains(h, scalar))
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// [`contains`] for two maps, without wrapping them in a [`Value`]
pub fn contains_object(haystack: &Map<String, Value>, pattern: &Map<String, Value>) -> bool {
    pattern
        .iter()
        .all(|(key, value)| haystack.get(key).is_some_and(|h| contains(h, value)))
}

/// Render a value as a chart label
///
/// This is the only place labels are derived, so bar groups and line series
/// agree: a number and the string spelling it (`8` and `"8"`) share a label,
/// and integral floats drop their fraction (`4.0` is `"4"`).
pub fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Largest magnitude below which every integral `f64` is exact
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Label of the field at `path`; missing and `null` fields have none
pub fn label_at(map: &Map<String, Value>, path: &str) -> Option<String> {
    get_in(map, path).filter(|value| !value.is_null()).map(label)
}

/// Reject object keys that a dotted path could not address
pub fn check_keys(map: &Map<String, Value>) -> Result<()> {
    for (key, value) in map {
        if key.is_empty() || key.contains('.') || key.contains('"') {
            return Err(Error::config(format!(
                "Key '{}' cannot be addressed by a dotted field path",
                key
            )));
        }
        if let Value::Object(inner) = value {
            check_keys(inner)?;
        }
    }
    Ok(())
}
