//! Session context holding every piece of mutable prediction state
//!
//! One `Workbench` stands in for a single operator's session: the uploaded
//! image, class names, prompt template, activation vector, sequential
//! selection and the model cache. Callers that share it across threads wrap
//! it in a mutex so predictions never observe a half-applied update.

use crate::aggregator::{predict_active, predict_selection, PredictionRequest};
use crate::backend::{Backend, ModelLoader};
use crate::cache::ModelCache;
use crate::class_names::ClassNameStore;
use crate::config::ModelsConfig;
use crate::engine::PredictionEngine;
use crate::prompt::PromptTemplate;
use crate::registry::{ActivationVector, CheckpointRegistry};
use crate::resolver::{SequentialRequest, SequentialResolver, SequentialSelection};
use clipscope_core::{Error, ModelPredictions, Result};
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry display names with their activation flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelsSnapshot {
    pub models: Vec<String>,
    pub active: Vec<u8>,
}

pub struct Workbench {
    registry: CheckpointRegistry,
    activation: ActivationVector,
    cache: Arc<ModelCache>,
    loader: Arc<dyn ModelLoader>,
    resolver: SequentialResolver,
    selection: SequentialSelection,
    prompt: PromptTemplate,
    class_names: ClassNameStore,
    image: Option<DynamicImage>,
    engine: PredictionEngine,
}

impl Workbench {
    /// Build a workbench from configuration and eagerly load the initially active slots
    ///
    /// A slot that fails to load here is logged and left active but unloaded.
    pub fn new(config: &ModelsConfig, backend: Backend) -> Result<Self> {
        config.validate()?;

        let registry = CheckpointRegistry::from_paths(config.checkpoints.iter().cloned());
        let flags: Vec<i64> = config.initial_activation().into_iter().map(i64::from).collect();
        let activation = ActivationVector::from_flags(&flags, registry.len())
            .map_err(|e| Error::config(e.to_string()))?;

        let cache = Arc::new(ModelCache::new(Arc::clone(&backend.loader)));
        let resolver = SequentialResolver::new(&config.models_root, Box::new(config.matcher()));
        let class_names = ClassNameStore::open(&config.class_names_path)?;
        let engine = PredictionEngine::new(backend.preprocessor, backend.tokenizer);

        let workbench = Self {
            registry,
            activation,
            cache,
            loader: backend.loader,
            resolver,
            selection: SequentialSelection::default(),
            prompt: config.prompt.clone(),
            class_names,
            image: None,
            engine,
        };

        for index in workbench.activation.active_indices() {
            if let Some(slot) = workbench.registry.get(index) {
                if let Err(e) = workbench.cache.ensure_loaded(slot.path()) {
                    warn!("Default model {} not loaded: {}", slot.display_name(), e);
                }
            }
        }

        info!(
            "Workbench ready: {} checkpoints, {} loaded, {} class names",
            workbench.registry.len(),
            workbench.cache.len(),
            workbench.class_names.names().len()
        );

        Ok(workbench)
    }

    /// Decode and store an uploaded image, replacing any previous one
    pub fn upload_image(&mut self, bytes: &[u8]) -> Result<()> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::validation(format!("Failed to decode image: {}", e)))?;
        info!("Uploaded image {}x{}", image.width(), image.height());
        self.image = Some(image);
        Ok(())
    }

    /// Store an already decoded image
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = Some(image);
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Prompts for the current template and class names
    pub fn prompts(&self) -> Vec<String> {
        self.prompt.build(self.class_names.names())
    }

    /// Score the current image with every active, loaded registry slot
    pub fn predict(&self) -> Result<ModelPredictions> {
        let prompts = self.prompts();
        predict_active(&self.request(&prompts), &self.registry, &self.activation)
    }

    /// Score the current image with the sequential selection
    pub fn predict_sequential(&self) -> Result<ModelPredictions> {
        let prompts = self.prompts();
        predict_selection(&self.request(&prompts), &self.selection, self.loader.as_ref())
    }

    fn request<'a>(&'a self, prompts: &'a [String]) -> PredictionRequest<'a> {
        PredictionRequest {
            engine: &self.engine,
            image: self.image.as_ref(),
            prompts,
            cache: &self.cache,
        }
    }

    /// Re-read the class names from their file
    pub fn reload_class_names(&mut self) -> Result<Vec<String>> {
        Ok(self.class_names.reload()?.to_vec())
    }

    /// Persist a new class-name list
    pub fn save_class_names(&mut self, names: Vec<String>) -> Result<()> {
        self.class_names.save(names)
    }

    pub fn class_names(&self) -> &[String] {
        self.class_names.names()
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    pub fn save_prompt(&mut self, prompt: PromptTemplate) {
        self.prompt = prompt;
    }

    pub fn models(&self) -> ModelsSnapshot {
        ModelsSnapshot {
            models: self.registry.display_names(),
            active: self.activation.to_ints(),
        }
    }

    /// Replace the activation vector and load every newly active slot
    ///
    /// An invalid vector leaves the previous one untouched. Once valid, the
    /// vector is applied before loading; a load failure aborts the remaining
    /// loads but keeps what was already loaded.
    pub fn set_active_models(&mut self, flags: &[i64]) -> Result<Vec<u8>> {
        let activation = ActivationVector::from_flags(flags, self.registry.len())?;
        self.activation = activation;

        for index in self.activation.active_indices() {
            if let Some(slot) = self.registry.get(index) {
                self.cache.ensure_loaded(slot.path())?;
            }
        }

        Ok(self.activation.to_ints())
    }

    /// Rebuild the sequential selection from dataset/method requests
    pub fn set_sequential_models(&mut self, requests: &[SequentialRequest]) -> Result<Vec<String>> {
        self.resolver
            .resolve(requests, &self.cache, &mut self.selection)
    }

    pub fn selection(&self) -> &SequentialSelection {
        &self.selection
    }

    pub fn registry(&self) -> &CheckpointRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }
}
