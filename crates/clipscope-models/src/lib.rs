//! Clipscope Models
//!
//! Multi-model inference orchestration for fine-tuned CLIP checkpoints.
//!
//! The pieces, leaf-first:
//! - [`registry`]: static checkpoint table and the activation vector over it
//! - [`cache`]: lazily loaded, never evicted model handles keyed by checkpoint path
//! - [`resolver`]: dataset/method selections resolved to checkpoint files on disk
//! - [`prompt`]: prefix + class name + suffix prompt construction
//! - [`engine`]: one image against one model and one prompt batch
//! - [`aggregator`]: the engine run across every active or resolved model
//! - [`workbench`]: the session context holding all mutable state
//!
//! The vision-language model itself sits behind the traits in [`backend`];
//! [`clip`] provides the Candle implementation and [`mock`] a deterministic
//! one for tests and demos.

pub mod aggregator;
pub mod backend;
pub mod cache;
pub mod class_names;
pub mod clip;
pub mod config;
pub mod engine;
pub mod mock;
pub mod prompt;
pub mod registry;
pub mod resolver;
pub mod workbench;

pub use backend::{Backend, ImagePreprocessor, ModelHandle, ModelLoader, PromptTokenizer, VisionLanguageModel};
pub use cache::ModelCache;
pub use clip::{ClipBackend, ClipVisionLanguage};
pub use class_names::ClassNameStore;
pub use config::{BaseModelSpec, DeviceSpec, ModelsConfig};
pub use engine::{PredictionEngine, PreparedInputs};
pub use prompt::{build_prompts, PromptTemplate};
pub use registry::{ActivationVector, CheckpointRegistry, CheckpointSlot};
pub use resolver::{
    CheckpointMatcher, SequentialRequest, SequentialResolver, SequentialSelection,
    SubstringMatcher, TrainingMethod, BASE_MODEL_NAME, SEQUENTIAL_DATASETS,
};
pub use mock::{MockLoader, MockModel};
pub use workbench::{ModelsSnapshot, Workbench};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{Backend, ModelHandle, ModelLoader, VisionLanguageModel};
    pub use crate::config::ModelsConfig;
    pub use crate::prompt::PromptTemplate;
    pub use crate::resolver::SequentialRequest;
    pub use crate::workbench::Workbench;
    pub use clipscope_core::{Error, ModelPredictions, RankedScores, Result};
}
