//! CLIP ViT backend built on Candle
//!
//! The base model (weights + BPE tokenizer) comes from a local file or the
//! Hugging Face Hub. Fine-tuned checkpoints are PyTorch `.pth` files (tensors
//! under a `state_dict` key, or at the root) or `.safetensors` files in
//! either the OpenAI `clip` or the Hugging Face parameter layout; their
//! parameters are copied over the base weights by name before the model is
//! built.

use crate::backend::{ImagePreprocessor, ModelHandle, ModelLoader, PromptTokenizer, VisionLanguageModel};
use crate::config::BaseModelSpec;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use clipscope_core::{Error, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use image::{imageops::FilterType, DynamicImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Maximum prompt length in tokens, including start and end markers
const CONTEXT_LENGTH: usize = 77;

/// End-of-text token, also used for padding
const EOT_TOKEN: &str = "<|endoftext|>";

/// OpenAI CLIP normalization
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const CLIP_STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

const WEIGHTS_FILENAME: &str = "model.safetensors";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Candle CLIP model in inference mode
pub struct ClipVisionLanguage {
    model: ClipModel,
}

impl VisionLanguageModel for ClipVisionLanguage {
    fn logits_per_image(&self, pixels: &Tensor, tokens: &Tensor) -> Result<Tensor> {
        let (_logits_per_text, logits_per_image) = self
            .model
            .forward(pixels, tokens)
            .map_err(|e| Error::prediction(format!("CLIP forward pass failed: {}", e)))?;
        Ok(logits_per_image)
    }
}

/// Outcome of applying a checkpoint onto the base weights
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Parameters replaced by the checkpoint
    pub applied: usize,
    /// Checkpoint entries the base architecture does not have
    pub ignored: Vec<String>,
}

/// CLIP loader, preprocessor and tokenizer sharing one set of base weights
pub struct ClipBackend {
    config: ClipConfig,
    base_weights: HashMap<String, Tensor>,
    tokenizer: Tokenizer,
    pad_id: u32,
    image_size: usize,
    device: Device,
}

impl ClipBackend {
    /// Load base weights and tokenizer
    pub fn load(spec: &BaseModelSpec, device: Device) -> Result<Self> {
        let weights_path = resolve_file(spec, spec.weights.as_deref(), WEIGHTS_FILENAME)?;
        let tokenizer_path = resolve_file(spec, spec.tokenizer.as_deref(), TOKENIZER_FILENAME)?;

        info!("Loading base CLIP weights from {}", weights_path.display());
        let base_weights = candle_core::safetensors::load(&weights_path, &device)
            .map_err(|e| Error::load(format!("Failed to load base weights: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::load(format!("Failed to load tokenizer: {}", e)))?;
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(EOT_TOKEN)
            .ok_or_else(|| Error::load(format!("Tokenizer has no {} token", EOT_TOKEN)))?;

        let backend = Self {
            config: clip_config(spec),
            base_weights,
            tokenizer,
            pad_id,
            image_size: spec.image_size,
            device,
        };

        // Fail at startup rather than on first prediction if the base weights don't fit
        backend.build(backend.base_weights.clone())?;
        info!("Base CLIP model ready on {:?}", backend.device);

        Ok(backend)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn build(&self, weights: HashMap<String, Tensor>) -> Result<ClipVisionLanguage> {
        let vb = VarBuilder::from_tensors(weights, DType::F32, &self.device);
        let model = ClipModel::new(vb, &self.config)
            .map_err(|e| Error::load(format!("Failed to build CLIP model: {}", e)))?;
        Ok(ClipVisionLanguage { model })
    }
}

impl ModelLoader for ClipBackend {
    fn load_base(&self) -> Result<ModelHandle> {
        Ok(Arc::new(self.build(self.base_weights.clone())?))
    }

    fn load_checkpoint(&self, path: &Path) -> Result<ModelHandle> {
        let checkpoint = read_checkpoint(path, &self.device)?;
        let (weights, report) = merge_state_dict(&self.base_weights, checkpoint)?;

        info!(
            "Applied {} parameters from {} ({} ignored)",
            report.applied,
            path.display(),
            report.ignored.len()
        );
        if !report.ignored.is_empty() {
            debug!("Ignored checkpoint entries: {:?}", report.ignored);
        }

        Ok(Arc::new(self.build(weights)?))
    }
}

impl ImagePreprocessor for ClipBackend {
    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor> {
        preprocess_image(image, self.image_size, &self.device)
            .map_err(|e| Error::prediction(format!("Failed to preprocess image: {}", e)))
    }
}

impl PromptTokenizer for ClipBackend {
    fn tokenize(&self, prompts: &[String]) -> Result<Tensor> {
        let mut batch = Vec::with_capacity(prompts.len());

        for prompt in prompts {
            let encoding = self
                .tokenizer
                .encode(prompt.as_str(), true)
                .map_err(|e| Error::prediction(format!("Failed to tokenize '{}': {}", prompt, e)))?;

            let ids = encoding.get_ids().to_vec();
            if ids.len() > CONTEXT_LENGTH {
                return Err(Error::prediction(format!(
                    "Input '{}' is too long for context length {}",
                    prompt, CONTEXT_LENGTH
                )));
            }
            batch.push(ids);
        }

        pad_batch(&mut batch, self.pad_id);

        Tensor::new(batch, &self.device)
            .map_err(|e| Error::prediction(format!("Failed to build token tensor: {}", e)))
    }
}

/// ViT-B/32 geometry with the configured patch and image size
fn clip_config(spec: &BaseModelSpec) -> ClipConfig {
    let mut config = ClipConfig::vit_base_patch32();
    config.vision_config.patch_size = spec.patch_size;
    config.vision_config.image_size = spec.image_size;
    config.image_size = spec.image_size;
    config
}

fn resolve_file(spec: &BaseModelSpec, local: Option<&Path>, filename: &str) -> Result<PathBuf> {
    if let Some(path) = local {
        if !path.exists() {
            return Err(Error::load(format!("File not found: {}", path.display())));
        }
        return Ok(path.to_path_buf());
    }

    let api = Api::new().map_err(|e| Error::load(format!("Failed to initialize HF API: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        spec.repo_id.clone(),
        RepoType::Model,
        spec.revision.clone(),
    ));

    repo.get(filename).map_err(|e| {
        Error::load(format!(
            "Failed to download {} from {}: {}",
            filename, spec.repo_id, e
        ))
    })
}

/// Read every tensor of a checkpoint file
pub fn read_checkpoint(path: &Path, device: &Device) -> Result<Vec<(String, Tensor)>> {
    if !path.exists() {
        return Err(Error::load(format!("checkpoint not found: {}", path.display())));
    }

    let is_safetensors = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("safetensors"));

    let tensors: Vec<(String, Tensor)> = if is_safetensors {
        candle_core::safetensors::load(path, device)
            .map_err(|e| Error::load(format!("Failed to read safetensors: {}", e)))?
            .into_iter()
            .collect()
    } else {
        let raw = match candle_core::pickle::read_all_with_key(path, Some("state_dict")) {
            Ok(tensors) => tensors,
            Err(_) => candle_core::pickle::read_all(path)
                .map_err(|e| Error::load(format!("Failed to read PyTorch checkpoint: {}", e)))?,
        };

        raw.into_iter()
            .map(|(name, t)| t.to_device(device).map(|t| (name, t)))
            .collect::<candle_core::Result<_>>()
            .map_err(|e| Error::load(format!("Failed to move checkpoint to device: {}", e)))?
    };

    if tensors.is_empty() {
        return Err(Error::load(format!("checkpoint has no tensors: {}", path.display())));
    }

    Ok(tensors)
}

/// Copy checkpoint parameters over the base weights by name
///
/// A leading `module.` is stripped from checkpoint names and OpenAI `clip`
/// names are translated to the Hugging Face layout of the base weights.
/// Names the base does not have are ignored; a known name with a different
/// shape is an error, and so is a checkpoint that replaces nothing.
pub fn merge_state_dict(
    base: &HashMap<String, Tensor>,
    checkpoint: Vec<(String, Tensor)>,
) -> Result<(HashMap<String, Tensor>, MergeReport)> {
    let mut merged = base.clone();
    let mut report = MergeReport::default();

    for (name, tensor) in checkpoint {
        let name = name.strip_prefix("module.").unwrap_or(&name).to_string();
        let entries = to_hf_layout(&name, tensor)
            .map_err(|e| Error::load(format!("Failed to convert {}: {}", name, e)))?;

        for (key, tensor) in entries {
            match base.get(&key) {
                Some(existing) if existing.dims() == tensor.dims() => {
                    let tensor = tensor
                        .to_dtype(existing.dtype())
                        .map_err(|e| Error::load(format!("Failed to convert {}: {}", key, e)))?;
                    merged.insert(key, tensor);
                    report.applied += 1;
                }
                Some(existing) => {
                    return Err(Error::load(format!(
                        "size mismatch for {}: checkpoint has {:?}, model has {:?}",
                        key,
                        tensor.dims(),
                        existing.dims()
                    )));
                }
                None => report.ignored.push(key),
            }
        }
    }

    if report.applied == 0 {
        return Err(Error::load(format!(
            "checkpoint shares no parameters with the base model ({} entries ignored)",
            report.ignored.len()
        )));
    }

    Ok((merged, report))
}

/// Translate one OpenAI `clip` parameter into Hugging Face CLIP names
///
/// Fused attention projections are split into q/k/v and the output
/// projections are transposed into linear weights. Names already in the
/// Hugging Face layout, and names neither layout knows, pass through.
fn to_hf_layout(name: &str, tensor: Tensor) -> candle_core::Result<Vec<(String, Tensor)>> {
    if let Some(rest) = name.strip_prefix("visual.transformer.resblocks.") {
        return resblock_to_hf("vision_model.encoder.layers", rest, tensor);
    }
    if let Some(rest) = name.strip_prefix("transformer.resblocks.") {
        return resblock_to_hf("text_model.encoder.layers", rest, tensor);
    }

    let key = if let Some(param) = name.strip_prefix("visual.ln_pre.") {
        format!("vision_model.pre_layrnorm.{}", param)
    } else if let Some(param) = name.strip_prefix("visual.ln_post.") {
        format!("vision_model.post_layernorm.{}", param)
    } else if let Some(param) = name.strip_prefix("ln_final.") {
        format!("text_model.final_layer_norm.{}", param)
    } else {
        match name {
            "visual.class_embedding" => "vision_model.embeddings.class_embedding".to_string(),
            "visual.positional_embedding" => {
                "vision_model.embeddings.position_embedding.weight".to_string()
            }
            "visual.conv1.weight" => "vision_model.embeddings.patch_embedding.weight".to_string(),
            "token_embedding.weight" => "text_model.embeddings.token_embedding.weight".to_string(),
            "positional_embedding" => "text_model.embeddings.position_embedding.weight".to_string(),
            "visual.proj" => {
                return Ok(vec![(
                    "visual_projection.weight".to_string(),
                    tensor.t()?.contiguous()?,
                )]);
            }
            "text_projection" => {
                return Ok(vec![(
                    "text_projection.weight".to_string(),
                    tensor.t()?.contiguous()?,
                )]);
            }
            _ => name.to_string(),
        }
    };

    Ok(vec![(key, tensor)])
}

fn resblock_to_hf(
    prefix: &str,
    rest: &str,
    tensor: Tensor,
) -> candle_core::Result<Vec<(String, Tensor)>> {
    let (index, param) = rest.split_once('.').unwrap_or((rest, ""));
    let layer = format!("{}.{}", prefix, index);

    let fused = match param {
        "attn.in_proj_weight" => Some("weight"),
        "attn.in_proj_bias" => Some("bias"),
        _ => None,
    };
    if let Some(kind) = fused {
        let mut split = Vec::with_capacity(3);
        for (proj, part) in ["q_proj", "k_proj", "v_proj"].iter().zip(tensor.chunk(3, 0)?) {
            split.push((format!("{}.self_attn.{}.{}", layer, proj, kind), part.contiguous()?));
        }
        return Ok(split);
    }

    let mapped = if let Some(p) = param.strip_prefix("attn.out_proj.") {
        format!("self_attn.out_proj.{}", p)
    } else if let Some(p) = param.strip_prefix("ln_1.") {
        format!("layer_norm1.{}", p)
    } else if let Some(p) = param.strip_prefix("ln_2.") {
        format!("layer_norm2.{}", p)
    } else if let Some(p) = param.strip_prefix("mlp.c_fc.") {
        format!("mlp.fc1.{}", p)
    } else if let Some(p) = param.strip_prefix("mlp.c_proj.") {
        format!("mlp.fc2.{}", p)
    } else {
        param.to_string()
    };

    Ok(vec![(format!("{}.{}", layer, mapped), tensor)])
}

/// Resize-and-crop to a square, normalize, and lay out as `[1, 3, size, size]`
pub fn preprocess_image(image: &DynamicImage, size: usize, device: &Device) -> candle_core::Result<Tensor> {
    let side = size as u32;
    let rgb = image.resize_to_fill(side, side, FilterType::CatmullRom).to_rgb8();
    let data = rgb.into_raw();

    let pixels = Tensor::from_vec(data, (size, size, 3), &Device::Cpu)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&CLIP_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&CLIP_STD, &Device::Cpu)?.reshape((3, 1, 1))?;

    (pixels.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .unsqueeze(0)?
        .to_device(device)
}

/// Right-pad every sequence to the longest one
fn pad_batch(batch: &mut [Vec<u32>], pad_id: u32) {
    let max_len = batch.iter().map(Vec::len).max().unwrap_or(0);
    for ids in batch.iter_mut() {
        ids.resize(max_len, pad_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn base() -> HashMap<String, Tensor> {
        let mut weights = HashMap::new();
        weights.insert(
            "visual_projection.weight".to_string(),
            Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap(),
        );
        weights.insert(
            "logit_scale".to_string(),
            Tensor::new(&[1.0f32], &Device::Cpu).unwrap(),
        );
        weights
    }

    #[test]
    fn test_merge_applies_known_and_ignores_unknown() {
        let checkpoint = vec![
            (
                "module.visual_projection.weight".to_string(),
                Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap(),
            ),
            (
                "optimizer.step".to_string(),
                Tensor::new(&[3.0f32], &Device::Cpu).unwrap(),
            ),
        ];

        let (merged, report) = merge_state_dict(&base(), checkpoint).unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.ignored, vec!["optimizer.step".to_string()]);
        assert_eq!(merged.len(), 2);
        let projection = merged["visual_projection.weight"].to_vec2::<f32>().unwrap();
        assert_eq!(projection, vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
        // untouched parameters keep their base value
        assert_eq!(merged["logit_scale"].to_vec1::<f32>().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_merge_translates_openai_layout() {
        let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap();
        let layer = "vision_model.encoder.layers.0.self_attn";

        let mut base = HashMap::new();
        base.insert("vision_model.embeddings.patch_embedding.weight".to_string(), zeros(&[4, 3, 2, 2]));
        base.insert(format!("{}.q_proj.weight", layer), zeros(&[4, 4]));
        base.insert(format!("{}.k_proj.weight", layer), zeros(&[4, 4]));
        base.insert(format!("{}.v_proj.weight", layer), zeros(&[4, 4]));
        base.insert("visual_projection.weight".to_string(), zeros(&[2, 4]));
        base.insert("text_model.embeddings.token_embedding.weight".to_string(), zeros(&[10, 4]));
        base.insert("text_model.final_layer_norm.weight".to_string(), zeros(&[4]));

        let fused = Tensor::arange(0f32, 48f32, &Device::Cpu).unwrap().reshape((12, 4)).unwrap();
        let proj = Tensor::arange(0f32, 8f32, &Device::Cpu).unwrap().reshape((4, 2)).unwrap();
        let checkpoint = vec![
            (
                "module.visual.conv1.weight".to_string(),
                Tensor::ones((4, 3, 2, 2), DType::F32, &Device::Cpu).unwrap(),
            ),
            ("visual.transformer.resblocks.0.attn.in_proj_weight".to_string(), fused),
            ("visual.proj".to_string(), proj),
            (
                "token_embedding.weight".to_string(),
                Tensor::ones((10, 4), DType::F32, &Device::Cpu).unwrap(),
            ),
            (
                "ln_final.weight".to_string(),
                Tensor::ones(4, DType::F32, &Device::Cpu).unwrap(),
            ),
        ];

        let (merged, report) = merge_state_dict(&base, checkpoint).unwrap();

        assert_eq!(report.applied, 7);
        assert!(report.ignored.is_empty());

        let patch_sum = merged["vision_model.embeddings.patch_embedding.weight"]
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(patch_sum, 48.0);

        let first = |key: String| merged[&key].to_vec2::<f32>().unwrap()[0][0];
        assert_eq!(first(format!("{}.q_proj.weight", layer)), 0.0);
        assert_eq!(first(format!("{}.k_proj.weight", layer)), 16.0);
        assert_eq!(first(format!("{}.v_proj.weight", layer)), 32.0);

        let projection = merged["visual_projection.weight"].to_vec2::<f32>().unwrap();
        assert_eq!(projection[0], vec![0.0, 2.0, 4.0, 6.0]);

        let tokens = merged["text_model.embeddings.token_embedding.weight"]
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(tokens, 40.0);
        assert_eq!(
            merged["text_model.final_layer_norm.weight"].to_vec1::<f32>().unwrap(),
            vec![1.0; 4]
        );
    }

    #[test]
    fn test_merge_rejects_checkpoint_with_no_known_parameters() {
        let checkpoint = vec![(
            "optimizer.step".to_string(),
            Tensor::new(&[3.0f32], &Device::Cpu).unwrap(),
        )];

        let err = merge_state_dict(&base(), checkpoint).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
        assert!(err.to_string().contains("no parameters"));
    }

    #[test]
    fn test_merge_rejects_shape_mismatch() {
        let checkpoint = vec![(
            "visual_projection.weight".to_string(),
            Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap(),
        )];

        let err = merge_state_dict(&base(), checkpoint).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
        assert!(err.to_string().contains("size mismatch"));
    }

    #[test]
    fn test_read_missing_checkpoint() {
        let err = read_checkpoint(Path::new("/nonexistent/ckpt.pth"), &Device::Cpu).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_read_garbage_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pth");
        std::fs::write(&path, b"definitely not a pickle").unwrap();

        assert!(matches!(read_checkpoint(&path, &Device::Cpu), Err(Error::Load(_))));
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 255, 255])));
        let tensor = preprocess_image(&image, 16, &Device::Cpu).unwrap();

        assert_eq!(tensor.dims(), &[1, 3, 16, 16]);

        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let red_white = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        assert!((values[0] - red_white).abs() < 1e-3);
    }

    #[test]
    fn test_pad_batch() {
        let mut batch = vec![vec![1, 2, 3], vec![1], vec![]];
        pad_batch(&mut batch, 9);
        assert_eq!(batch, vec![vec![1, 2, 3], vec![1, 9, 9], vec![9, 9, 9]]);
    }
}
