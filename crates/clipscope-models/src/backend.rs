//! Seams between the orchestration layer and the vision-language model
//!
//! Everything model-specific (pixel preprocessing, tokenization, the joint
//! forward pass, weight loading) lives behind these traits so the registry,
//! cache, resolver and aggregator never depend on a concrete architecture.

use candle_core::Tensor;
use clipscope_core::Result;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

/// A ready-to-run vision-language model in inference mode
pub trait VisionLanguageModel: Send + Sync {
    /// Joint image/text scoring
    ///
    /// `pixels` is a preprocessed batch of one image, `tokens` a batch of
    /// prompts. Returns logits of shape `[1, n_prompts]`.
    fn logits_per_image(&self, pixels: &Tensor, tokens: &Tensor) -> Result<Tensor>;
}

/// Shared handle to a loaded model
pub type ModelHandle = Arc<dyn VisionLanguageModel>;

/// Turns a decoded image into the model's pixel tensor
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor>;
}

/// Turns prompts into the model's token tensor
pub trait PromptTokenizer: Send + Sync {
    fn tokenize(&self, prompts: &[String]) -> Result<Tensor>;
}

/// Constructs models, either the unmodified base or base + checkpoint weights
pub trait ModelLoader: Send + Sync {
    /// Construct a fresh, unmodified base model
    fn load_base(&self) -> Result<ModelHandle>;

    /// Construct a base model and apply the checkpoint at `path` onto it
    ///
    /// Parameter matching is non-strict: checkpoint entries the base
    /// architecture does not know are ignored.
    fn load_checkpoint(&self, path: &Path) -> Result<ModelHandle>;
}

/// The three collaborators a workbench needs, bundled
#[derive(Clone)]
pub struct Backend {
    pub loader: Arc<dyn ModelLoader>,
    pub preprocessor: Arc<dyn ImagePreprocessor>,
    pub tokenizer: Arc<dyn PromptTokenizer>,
}

impl Backend {
    /// Bundle a single value implementing all three seams
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: ModelLoader + ImagePreprocessor + PromptTokenizer + 'static,
    {
        Self {
            loader: backend.clone(),
            preprocessor: backend.clone(),
            tokenizer: backend,
        }
    }
}
