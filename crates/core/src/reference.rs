//! Read-through cache of rarely-changing reference lists
//!
//! Each list goes from uninitialized to populated on first use and then
//! never changes for the lifetime of the cache. The engine owns one cache
//! for the whole process; [`crate::Engine::reset_reference_cache`] swaps in
//! an empty one, which is only meant for tests and tooling.

use crate::data::SdkInfo;
use crate::error::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ReferenceCache {
    cluster_versions: OnceCell<Arc<Vec<String>>>,
    sdks: OnceCell<Arc<Vec<SdkInfo>>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster versions, loading them with `load` on first use
    ///
    /// A failed load leaves the list uninitialized so a later call can retry.
    pub fn cluster_versions<F>(&self, load: F) -> Result<Arc<Vec<String>>>
    where
        F: FnOnce() -> Result<Vec<String>>,
    {
        self.cluster_versions
            .get_or_try_init(|| {
                let versions = load()?;
                debug!(count = versions.len(), "Cached cluster versions");
                Ok(Arc::new(versions))
            })
            .cloned()
    }

    /// SDK metadata, loading it with `load` on first use
    pub fn sdks<F>(&self, load: F) -> Result<Arc<Vec<SdkInfo>>>
    where
        F: FnOnce() -> Result<Vec<SdkInfo>>,
    {
        self.sdks
            .get_or_try_init(|| {
                let sdks = load()?;
                debug!(count = sdks.len(), "Cached SDK metadata");
                Ok(Arc::new(sdks))
            })
            .cloned()
    }

    pub fn is_populated(&self) -> bool {
        self.cluster_versions.get().is_some() && self.sdks.get().is_some()
    }

    /// Drop every cached list
    pub fn reset(&mut self) {
        self.cluster_versions.take();
        self.sdks.take();
    }
}
