//! Entry point tying run resolution, the chart builders and reference data together

use crate::bar;
use crate::containment;
use crate::data::{Run, SdkInfo};
use crate::error::{Error, Result};
use crate::line;
use crate::query::{
    ChartMode, ChartRequest, ChartResponse, ComparisonFilter, LineChart, RunChartRequest,
    RunFilterMode,
};
use crate::reference::ReferenceCache;
use crate::run_filter::{RunFilter, DEFAULT_GERRIT_PREFIX};
use crate::store::RunStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound of pooled store connections
    pub max_pool_size: u32,
    /// SDK versions starting with this prefix are code-review builds
    pub gerrit_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 8,
            gerrit_prefix: DEFAULT_GERRIT_PREFIX.to_string(),
        }
    }
}

pub struct Engine<S: RunStore> {
    store: Arc<S>,
    config: EngineConfig,
    reference: Arc<ReferenceCache>,
}

impl<S: RunStore> Engine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    pub fn with_shared_store(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            reference: Arc::new(ReferenceCache::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate a chart request
    pub async fn chart(&self, request: &ChartRequest) -> Result<ChartResponse> {
        request.validate()?;
        info!(
            mode = ?request.chart_mode,
            group_by = %request.horizontal_axis.database_field,
            axes = request.vertical_axes.len(),
            "Evaluating chart request"
        );

        match request.chart_mode {
            ChartMode::Simplified => {
                bar::measure(request)?;
                let runs = self.resolve(request).await?;
                Ok(ChartResponse::Bar(bar::build(&self.store, request, runs).await?))
            }
            ChartMode::Full => {
                line::validate_axes(&request.vertical_axes)?;
                let runs = self.resolve(request).await?;
                Ok(ChartResponse::Line(line::build(&self.store, request, runs).await?))
            }
        }
    }

    /// Line chart of a single run, shaped exactly like a full-mode chart of that run
    pub async fn run_chart(&self, request: &RunChartRequest) -> Result<LineChart> {
        let chart_request = request.to_chart_request();
        chart_request.validate()?;
        line::validate_axes(&chart_request.vertical_axes)?;

        let store = Arc::clone(&self.store);
        let run_id = request.run_id.clone();
        let run = tokio::task::spawn_blocking(move || store.run(&run_id))
            .await??
            .ok_or_else(|| Error::NotFound {
                run_id: request.run_id.clone(),
            })?;

        debug!(run_id = %run.id, "Building single-run chart");
        line::build(&self.store, &chart_request, vec![run]).await
    }

    /// Runs matching a filter, after exclusions and version selection
    pub async fn runs(
        &self,
        filter: &ComparisonFilter,
        mode: RunFilterMode,
        exclude_snapshots: bool,
        exclude_gerrit: bool,
    ) -> Result<Vec<Run>> {
        let run_filter = RunFilter::new(mode, exclude_snapshots, exclude_gerrit)
            .with_gerrit_prefix(self.config.gerrit_prefix.clone());
        self.find(filter, &run_filter).await
    }

    async fn resolve(&self, request: &ChartRequest) -> Result<Vec<Run>> {
        self.runs(
            &request.comparison_filter,
            request.run_filter_mode,
            request.exclude_snapshots,
            request.exclude_gerrit,
        )
        .await
    }

    async fn find(&self, filter: &ComparisonFilter, run_filter: &RunFilter) -> Result<Vec<Run>> {
        let compiled = containment::compile(filter)?;
        let query = compiled.clone();
        let store = Arc::clone(&self.store);

        let candidates = tokio::task::spawn_blocking(move || store.find_runs(&query)).await??;
        let candidates = compiled.apply_exclusions(candidates);
        let runs = run_filter.apply(candidates);

        debug!(runs = runs.len(), "Resolved runs");
        Ok(runs)
    }

    /// Distinct cluster versions, loaded once per cache
    pub async fn cluster_versions(&self) -> Result<Arc<Vec<String>>> {
        let store = Arc::clone(&self.store);
        let reference = Arc::clone(&self.reference);
        tokio::task::spawn_blocking(move || reference.cluster_versions(|| store.cluster_versions()))
            .await?
    }

    /// SDK languages and their versions, loaded once per cache
    pub async fn sdks(&self) -> Result<Arc<Vec<SdkInfo>>> {
        let store = Arc::clone(&self.store);
        let reference = Arc::clone(&self.reference);
        tokio::task::spawn_blocking(move || reference.sdks(|| store.sdks())).await?
    }

    pub fn reference_cache(&self) -> &ReferenceCache {
        &self.reference
    }

    /// Forget cached reference data; the next lookup reloads it from the store
    pub fn reset_reference_cache(&mut self) {
        match Arc::get_mut(&mut self.reference) {
            Some(cache) => cache.reset(),
            // A lookup still holds the old cache; it finishes against it
            None => self.reference = Arc::new(ReferenceCache::new()),
        }
    }
}
