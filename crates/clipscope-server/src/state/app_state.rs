use clipscope_core::Result;
use clipscope_models::mock::MockLoader;
use clipscope_models::{Backend, ClipBackend, ModelsConfig, Workbench};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The one session every request operates on
    pub workbench: Arc<Mutex<Workbench>>,

    /// Built front-end root
    pub frontend_dir: Arc<PathBuf>,

    /// Prometheus renderer, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(workbench: Workbench, frontend_dir: impl Into<PathBuf>) -> Self {
        Self {
            workbench: Arc::new(Mutex::new(workbench)),
            frontend_dir: Arc::new(frontend_dir.into()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn frontend_dir(&self) -> &Path {
        &self.frontend_dir
    }
}

/// Build the workbench on either the CLIP or the mock backend
///
/// Blocking: downloads and loads model weights.
pub fn build_workbench(config: &ModelsConfig, mock: bool) -> Result<Workbench> {
    let backend = if mock {
        info!("Using mock backend");
        Backend::mock(Arc::new(MockLoader::new()))
    } else {
        let device = config.device.to_device()?;
        Backend::from_shared(Arc::new(ClipBackend::load(&config.base_model, device)?))
    };

    Workbench::new(config, backend)
}
