//! Configuration for the checkpoint registry, resolver and base model

use crate::prompt::PromptTemplate;
use crate::resolver::SubstringMatcher;
use candle_core::Device;
use clipscope_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for everything model-related
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Static checkpoint registry, in display order
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<PathBuf>,

    /// Initial activation vector; defaults to only the first slot active
    #[serde(default)]
    pub default_active: Option<Vec<u8>>,

    /// Root of the `{method}/{file}` checkpoint tree used by sequential resolution
    #[serde(default = "default_models_root")]
    pub models_root: PathBuf,

    /// File extension (without the dot) identifying checkpoint files
    #[serde(default = "default_checkpoint_extension")]
    pub checkpoint_extension: String,

    /// Flat file holding the class names, one per line
    #[serde(default = "default_class_names_path")]
    pub class_names_path: PathBuf,

    /// Initial prompt template
    #[serde(default)]
    pub prompt: PromptTemplate,

    /// Base model the checkpoints were fine-tuned from
    #[serde(default)]
    pub base_model: BaseModelSpec,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,
}

/// Base CLIP model source and geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseModelSpec {
    /// Hugging Face repository holding `model.safetensors` and `tokenizer.json`
    #[serde(default = "default_base_repo")]
    pub repo_id: String,

    /// Repository revision
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Local weights file, bypassing the hub
    #[serde(default)]
    pub weights: Option<PathBuf>,

    /// Local tokenizer file, bypassing the hub
    #[serde(default)]
    pub tokenizer: Option<PathBuf>,

    /// Vision transformer patch size (16 for ViT-B/16)
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,

    /// Square input resolution
    #[serde(default = "default_image_size")]
    pub image_size: usize,
}

/// Inference device (for config files)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    /// Accelerator if present, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl ModelsConfig {
    /// Parse configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse models config: {}", e)))
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// The activation vector to start with
    pub fn initial_activation(&self) -> Vec<u8> {
        match &self.default_active {
            Some(active) => active.clone(),
            None => (0..self.checkpoints.len())
                .map(|i| u8::from(i == 0))
                .collect(),
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.checkpoints.is_empty() {
            return Err(Error::config("checkpoint registry is empty"));
        }

        let active = self.initial_activation();
        if active.len() != self.checkpoints.len() {
            return Err(Error::config(format!(
                "default_active has {} entries but the registry has {} checkpoints",
                active.len(),
                self.checkpoints.len()
            )));
        }
        if active.iter().any(|v| *v > 1) {
            return Err(Error::config("default_active must contain only 0 or 1 values"));
        }

        if self.checkpoint_extension.trim_start_matches('.').is_empty() {
            return Err(Error::config("checkpoint_extension must not be empty"));
        }

        if self.base_model.patch_size == 0 || self.base_model.image_size == 0 {
            return Err(Error::config("base model patch_size and image_size must be positive"));
        }

        Ok(())
    }

    /// Checkpoint matcher honouring the configured extension
    pub fn matcher(&self) -> SubstringMatcher {
        SubstringMatcher::new(&self.checkpoint_extension)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            default_active: None,
            models_root: default_models_root(),
            checkpoint_extension: default_checkpoint_extension(),
            class_names_path: default_class_names_path(),
            prompt: PromptTemplate::default(),
            base_model: BaseModelSpec::default(),
            device: DeviceSpec::default(),
        }
    }
}

impl Default for BaseModelSpec {
    fn default() -> Self {
        Self {
            repo_id: default_base_repo(),
            revision: default_revision(),
            weights: None,
            tokenizer: None,
            patch_size: default_patch_size(),
            image_size: default_image_size(),
        }
    }
}

impl DeviceSpec {
    /// Create the Candle device
    pub fn to_device(&self) -> Result<Device> {
        match self {
            DeviceSpec::Auto => Device::cuda_if_available(0)
                .map_err(|e| Error::config(format!("Failed to probe for an accelerator: {}", e))),
            DeviceSpec::Cpu => Ok(Device::Cpu),
            DeviceSpec::Cuda { index } => Device::new_cuda(index.unwrap_or(0))
                .map_err(|e| Error::config(format!("Failed to create CUDA device: {}", e))),
            DeviceSpec::Metal { index } => Device::new_metal(index.unwrap_or(0))
                .map_err(|e| Error::config(format!("Failed to create Metal device: {}", e))),
        }
    }
}

impl std::str::FromStr for DeviceSpec {
    type Err = String;

    /// Parses `auto`, `cpu`, `cuda`, `cuda:N`, `metal`, `metal:N`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (kind, index) = match lower.split_once(':') {
            Some((kind, index)) => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| format!("invalid device index in '{}'", s))?;
                (kind.to_string(), Some(index))
            }
            None => (lower, None),
        };

        match (kind.as_str(), index) {
            ("auto", None) => Ok(Self::Auto),
            ("cpu", None) => Ok(Self::Cpu),
            ("cuda", index) => Ok(Self::Cuda { index }),
            ("metal", index) => Ok(Self::Metal { index }),
            _ => Err(format!("unknown device '{}'", s)),
        }
    }
}

fn default_checkpoints() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./models/frozen_zscl.pth"),
        PathBuf::from("./models/pure_finetune.pth"),
    ]
}

fn default_models_root() -> PathBuf {
    PathBuf::from("./models")
}

fn default_checkpoint_extension() -> String {
    "pth".to_string()
}

fn default_class_names_path() -> PathBuf {
    PathBuf::from("./imagenet_classes.txt")
}

fn default_base_repo() -> String {
    "openai/clip-vit-base-patch16".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_patch_size() -> usize {
    16
}

fn default_image_size() -> usize {
    224
}
