//! Semantic-version aware string comparison
//!
//! The same ordering backs "latest version" selection in the run filter and
//! axis ordering in the result orderer, so the two can never disagree.
//!
//! Ordering rules, applied in turn:
//!
//! 1. Strings with a numeric dot-separated prefix sort before strings without
//!    one; the latter compare lexically among themselves.
//! 2. Numeric prefixes compare component by component, missing components
//!    count as zero (`3.0` and `3.0.0` share a core).
//! 3. With equal cores, the stable release sorts before any suffixed build
//!    of it (`3.0.6` < `3.0.6-SNAPSHOT`, `2.0.0` < `2.0.0.Final`). Whatever
//!    follows the numeric prefix is the suffix, with one leading `-`, `+`
//!    or `.` dropped.
//! 4. Two suffixes split on `.` and `-`; numeric identifiers compare
//!    numerically and sort before alphanumeric ones, alphanumeric ones
//!    compare ASCII-lexically, and a suffix that is a prefix of another
//!    sorts first.
//! 5. Anything still tied is ordered byte-wise on the full string, so
//!    `Equal` is only returned for identical strings.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?(\d+(?:\.\d+)*)[-+.]?(.*)$").expect("version regex is valid")
});

/// A version string split into its numeric core and optional suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion<'a> {
    pub core: Vec<u64>,
    pub suffix: Option<&'a str>,
}

/// Parse a version string, returning `None` when it has no numeric prefix
pub fn parse(version: &str) -> Option<ParsedVersion<'_>> {
    let captures = VERSION_REGEX.captures(version.trim())?;

    let core = captures
        .get(1)?
        .as_str()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let suffix = captures
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty());

    Some(ParsedVersion { core, suffix })
}

/// Whether a version is a snapshot/pre-release build (contains a hyphen)
pub fn is_snapshot(version: &str) -> bool {
    version.contains('-')
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(left), Some(right)) => compare_core(&left.core, &right.core)
            .then_with(|| compare_suffix(left.suffix, right.suffix))
            .then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_core(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn compare_suffix(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        // stable release first
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => {
            let mut left_ids = l.split(['.', '-']);
            let mut right_ids = r.split(['.', '-']);
            loop {
                match (left_ids.next(), right_ids.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(li), Some(ri)) => {
                        let ordering = compare_identifier(li, ri);
                        if ordering.is_ne() {
                            return ordering;
                        }
                    }
                }
            }
        }
    }
}

fn compare_identifier(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}
