//! Runs the prediction engine across several models and merges the results

use crate::backend::ModelLoader;
use crate::cache::ModelCache;
use crate::engine::PredictionEngine;
use crate::registry::{ActivationVector, CheckpointRegistry};
use crate::resolver::{SequentialSelection, BASE_MODEL_NAME};
use clipscope_core::{Error, ModelPredictions, Result};
use image::DynamicImage;
use tracing::{debug, info};

/// Inputs shared by both aggregation variants
pub struct PredictionRequest<'a> {
    pub engine: &'a PredictionEngine,
    pub image: Option<&'a DynamicImage>,
    pub prompts: &'a [String],
    pub cache: &'a ModelCache,
}

impl<'a> PredictionRequest<'a> {
    fn image(&self) -> Result<&'a DynamicImage> {
        self.image
            .ok_or_else(|| Error::validation("No image uploaded yet"))
    }

    fn check_prompts(&self) -> Result<()> {
        if self.prompts.is_empty() {
            return Err(Error::validation("No class names configured"));
        }
        Ok(())
    }
}

/// Score every active registry slot that is already cached
///
/// Active slots missing from the cache are skipped.
pub fn predict_active(
    request: &PredictionRequest<'_>,
    registry: &CheckpointRegistry,
    activation: &ActivationVector,
) -> Result<ModelPredictions> {
    let image = request.image()?;

    let active = activation.active_indices();
    if active.is_empty() {
        return Err(Error::validation("No active models selected"));
    }
    request.check_prompts()?;

    let inputs = request.engine.prepare(image, request.prompts)?;
    let mut predictions = ModelPredictions::new();

    for slot in active.into_iter().filter_map(|i| registry.get(i)) {
        let Some(model) = request.cache.get(slot.path()) else {
            debug!("Skipping {}: active but not loaded", slot.display_name());
            continue;
        };

        let scores = request.engine.score(&inputs, model.as_ref())?;
        predictions.insert(slot.display_name(), scores);
    }

    metrics::counter!("clipscope_predictions_total", "mode" => "basic").increment(1);
    info!("Basic prediction over {} models", predictions.len());

    Ok(predictions)
}

/// Score the sequential selection: the base model first if selected, then each checkpoint
///
/// The base model is constructed fresh for every call rather than cached.
pub fn predict_selection(
    request: &PredictionRequest<'_>,
    selection: &SequentialSelection,
    loader: &dyn ModelLoader,
) -> Result<ModelPredictions> {
    let image = request.image()?;

    if selection.is_empty() {
        return Err(Error::validation("No sequential models selected"));
    }
    request.check_prompts()?;

    let inputs = request.engine.prepare(image, request.prompts)?;
    let mut predictions = ModelPredictions::new();

    if selection.include_base() {
        let base = loader.load_base().map_err(|e| match e {
            Error::Load(_) => e,
            other => Error::load(format!("Failed to construct base model: {}", other)),
        })?;
        let scores = request.engine.score(&inputs, base.as_ref())?;
        predictions.insert(BASE_MODEL_NAME, scores);
    }

    for slot in selection.checkpoints() {
        let model = request.cache.ensure_loaded(slot.path())?;
        let scores = request.engine.score(&inputs, model.as_ref())?;
        predictions.insert(slot.display_name(), scores);
    }

    metrics::counter!("clipscope_predictions_total", "mode" => "sequential").increment(1);
    info!("Sequential prediction over {} models", predictions.len());

    Ok(predictions)
}
