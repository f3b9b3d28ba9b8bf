//! Snapshot/Gerrit exclusion and latest-version selection over candidate runs

use crate::data::Run;
use crate::query::RunFilterMode;
use crate::version;
use std::collections::HashMap;
use tracing::debug;

/// Prefix identifying versions that reference an in-review change rather than a release
pub const DEFAULT_GERRIT_PREFIX: &str = "refs/";

/// Options controlling [`filter_runs`]
#[derive(Debug, Clone)]
pub struct RunFilter {
    pub mode: RunFilterMode,
    pub exclude_snapshots: bool,
    pub exclude_gerrit: bool,
    pub gerrit_prefix: String,
}

impl RunFilter {
    pub fn new(mode: RunFilterMode, exclude_snapshots: bool, exclude_gerrit: bool) -> Self {
        Self {
            mode,
            exclude_snapshots,
            exclude_gerrit,
            gerrit_prefix: DEFAULT_GERRIT_PREFIX.to_string(),
        }
    }

    pub fn with_gerrit_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.gerrit_prefix = prefix.into();
        self
    }

    fn is_gerrit(&self, version: &str) -> bool {
        version.starts_with(self.gerrit_prefix.as_str())
    }

    /// Whether a version may be picked as the latest of its SDK
    ///
    /// Strings without a numeric prefix (branch names, review refs) are never
    /// eligible.
    fn eligible_for_latest(&self, version: &str) -> bool {
        if self.is_gerrit(version) || version::parse(version).is_none() {
            return false;
        }
        !(self.mode == RunFilterMode::LatestNonSnapshot && version::is_snapshot(version))
    }

    /// Highest eligible version per SDK language
    ///
    /// Needs the whole candidate set before any run can be accepted, which is
    /// why filtering happens in two passes.
    pub fn latest_versions<'a>(&self, runs: &'a [Run]) -> HashMap<&'a str, &'a str> {
        let mut latest: HashMap<&str, &str> = HashMap::new();

        for run in runs {
            let (Some(language), Some(version)) =
                (run.params.sdk_language(), run.params.sdk_version())
            else {
                continue;
            };

            if !self.eligible_for_latest(version) {
                continue;
            }

            latest
                .entry(language)
                .and_modify(|current| {
                    if version::compare(version, current).is_gt() {
                        *current = version;
                    }
                })
                .or_insert(version);
        }

        latest
    }

    /// Apply exclusions and, for the latest modes, keep only each SDK's highest version
    pub fn apply(&self, runs: Vec<Run>) -> Vec<Run> {
        let candidates = runs.len();

        let latest: HashMap<String, String> = if self.mode.selects_latest() {
            self.latest_versions(&runs)
                .into_iter()
                .map(|(language, version)| (language.to_string(), version.to_string()))
                .collect()
        } else {
            HashMap::new()
        };

        let kept: Vec<Run> = runs
            .into_iter()
            .filter(|run| {
                let version = run.params.sdk_version();

                if let Some(version) = version {
                    if self.exclude_gerrit && self.is_gerrit(version) {
                        return false;
                    }
                    if self.exclude_snapshots && version::is_snapshot(version) {
                        return false;
                    }
                }

                if !self.mode.selects_latest() {
                    return true;
                }

                match (run.params.sdk_language(), version) {
                    (Some(language), Some(version)) => latest
                        .get(language)
                        .is_some_and(|latest| latest == version),
                    _ => false,
                }
            })
            .collect();

        debug!(
            mode = ?self.mode,
            candidates,
            kept = kept.len(),
            "Filtered candidate runs"
        );

        kept
    }
}

/// Convenience wrapper around [`RunFilter::apply`]
pub fn filter_runs(
    runs: Vec<Run>,
    mode: RunFilterMode,
    exclude_snapshots: bool,
    exclude_gerrit: bool,
) -> Vec<Run> {
    RunFilter::new(mode, exclude_snapshots, exclude_gerrit).apply(runs)
}
