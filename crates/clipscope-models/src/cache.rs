//! Lazily populated model cache keyed by checkpoint path

use crate::backend::{ModelHandle, ModelLoader};
use clipscope_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Loaded models by checkpoint path
///
/// Entries are inserted at most once and never evicted. Concurrent
/// `ensure_loaded` calls for the same uncached path are coalesced into a
/// single load through a per-path lock.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    models: RwLock<HashMap<PathBuf, ModelHandle>>,
    load_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ModelCache {
    /// Create an empty cache backed by `loader`
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the model for `path`, loading it on first use
    pub fn ensure_loaded(&self, path: &Path) -> Result<ModelHandle> {
        if let Some(model) = self.get(path) {
            debug!("Model cache hit for {}", path.display());
            return Ok(model);
        }

        let lock = {
            let mut locks = self.load_locks.lock();
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let _guard = lock.lock();

        // Another caller may have finished the load while we waited
        if let Some(model) = self.get(path) {
            return Ok(model);
        }

        info!("Loading checkpoint {}", path.display());
        let start = Instant::now();

        let model = match self.loader.load_checkpoint(path) {
            Ok(model) => model,
            Err(e) => {
                warn!("Failed to load checkpoint {}: {}", path.display(), e);
                metrics::counter!("clipscope_model_loads_total", "outcome" => "error").increment(1);
                return Err(Error::load(format!(
                    "Failed to load model {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let elapsed = start.elapsed();
        metrics::counter!("clipscope_model_loads_total", "outcome" => "ok").increment(1);
        metrics::histogram!("clipscope_model_load_latency_ms").record(elapsed.as_secs_f64() * 1000.0);
        info!("Loaded checkpoint {} in {:?}", path.display(), elapsed);

        self.models
            .write()
            .insert(path.to_path_buf(), Arc::clone(&model));

        Ok(model)
    }

    /// Cached model for `path`, without loading
    pub fn get(&self, path: &Path) -> Option<ModelHandle> {
        self.models.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.models.read().contains_key(path)
    }

    /// Paths currently cached
    pub fn paths(&self) -> Vec<PathBuf> {
        self.models.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// The loader used for cache misses
    pub fn loader(&self) -> &Arc<dyn ModelLoader> {
        &self.loader
    }
}
