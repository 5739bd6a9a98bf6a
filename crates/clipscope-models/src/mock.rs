//! Deterministic stand-in for the vision-language backend
//!
//! Used by tests and by the server's `--mock` mode. A mock checkpoint is a
//! text file holding a single float, the model's logit scale. Prompt tokens
//! are the prompt's character count, so with a positive scale longer prompts
//! score higher.

use crate::backend::{Backend, ImagePreprocessor, ModelHandle, ModelLoader, PromptTokenizer, VisionLanguageModel};
use candle_core::{DType, Device, Tensor};
use clipscope_core::{Error, Result};
use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock model computing `logit = scale * token`
pub struct MockModel {
    scale: f32,
    fail: bool,
    extra_logits: usize,
    calls: AtomicUsize,
}

impl MockModel {
    pub fn new(scale: f32) -> Self {
        Self {
            scale,
            fail: false,
            extra_logits: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Model whose forward pass always errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(1.0)
        }
    }

    /// Model returning `extra` more logits than there are prompts
    pub fn misshapen(extra: usize) -> Self {
        Self {
            extra_logits: extra,
            ..Self::new(1.0)
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Number of forward passes run
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl VisionLanguageModel for MockModel {
    fn logits_per_image(&self, _pixels: &Tensor, tokens: &Tensor) -> Result<Tensor> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.fail {
            return Err(Error::prediction("mock forward pass failed"));
        }

        let logits = tokens
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.affine(self.scale as f64, 0.0))
            .map_err(|e| Error::prediction(e.to_string()))?;

        let logits = if self.extra_logits > 0 {
            let pad = Tensor::zeros(self.extra_logits, DType::F32, &Device::Cpu)
                .map_err(|e| Error::prediction(e.to_string()))?;
            Tensor::cat(&[&logits, &pad], 0).map_err(|e| Error::prediction(e.to_string()))?
        } else {
            logits
        };

        logits
            .unsqueeze(0)
            .map_err(|e| Error::prediction(e.to_string()))
    }
}

/// Mock loader reading a scale from each checkpoint file
pub struct MockLoader {
    base_scale: f32,
    load_delay: Option<Duration>,
    loads: Mutex<HashMap<PathBuf, usize>>,
    base_loads: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            base_scale: 0.0,
            load_delay: None,
            loads: Mutex::new(HashMap::new()),
            base_loads: AtomicUsize::new(0),
        }
    }

    /// Logit scale of the base model (0.0 gives a uniform distribution)
    pub fn with_base_scale(mut self, scale: f32) -> Self {
        self.base_scale = scale;
        self
    }

    /// Sleep this long inside every checkpoint load
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Number of times `path` was read from disk
    pub fn load_count(&self, path: &Path) -> usize {
        self.loads.lock().get(path).copied().unwrap_or(0)
    }

    /// Total checkpoint reads across all paths
    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    /// Number of base models constructed
    pub fn base_loads(&self) -> usize {
        self.base_loads.load(Ordering::Relaxed)
    }
}

impl Default for MockLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader for MockLoader {
    fn load_base(&self) -> Result<ModelHandle> {
        self.base_loads.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockModel::new(self.base_scale)))
    }

    fn load_checkpoint(&self, path: &Path) -> Result<ModelHandle> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        *self.loads.lock().entry(path.to_path_buf()).or_insert(0) += 1;

        if !path.exists() {
            return Err(Error::load(format!("checkpoint not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::load(format!("failed to read checkpoint: {}", e)))?;
        let scale = content
            .trim()
            .parse::<f32>()
            .map_err(|_| Error::load(format!("malformed checkpoint: {}", path.display())))?;

        Ok(Arc::new(MockModel::new(scale)))
    }
}

/// Tokenizer emitting one token per prompt: its character count
#[derive(Debug, Default, Clone, Copy)]
pub struct MockTokenizer;

impl PromptTokenizer for MockTokenizer {
    fn tokenize(&self, prompts: &[String]) -> Result<Tensor> {
        let tokens: Vec<u32> = prompts.iter().map(|p| p.chars().count() as u32).collect();
        Tensor::from_vec(tokens, (prompts.len(), 1), &Device::Cpu)
            .map_err(|e| Error::prediction(e.to_string()))
    }
}

/// Preprocessor emitting a small constant pixel tensor
#[derive(Debug, Default, Clone, Copy)]
pub struct MockPreprocessor;

impl ImagePreprocessor for MockPreprocessor {
    fn preprocess(&self, _image: &DynamicImage) -> Result<Tensor> {
        Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu)
            .map_err(|e| Error::prediction(e.to_string()))
    }
}

impl Backend {
    /// Backend built from the mock collaborators
    pub fn mock(loader: Arc<MockLoader>) -> Self {
        Self {
            loader,
            preprocessor: Arc::new(MockPreprocessor),
            tokenizer: Arc::new(MockTokenizer),
        }
    }
}
