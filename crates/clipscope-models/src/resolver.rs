//! Resolution of dataset/method selections to checkpoint files
//!
//! Checkpoints for sequential comparisons live under
//! `{models_root}/{method folder}/{file}`. A selection names a dataset by its
//! index into [`SEQUENTIAL_DATASETS`] and a training method; the resolver
//! scans that method's folder for a checkpoint whose file name mentions the
//! dataset. Index 0 is the unmodified base model and needs no file.

use crate::cache::ModelCache;
use crate::registry::CheckpointSlot;
use clipscope_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Datasets a sequential selection can index, in the order clients use
pub const SEQUENTIAL_DATASETS: [&str; 5] = ["Base Model/CLIP", "DTD", "MNIST", "EuroSAT", "Flowers"];

/// Result key of the unmodified base model
pub const BASE_MODEL_NAME: &str = "Base Model/CLIP";

/// Fine-tuning methods with a checkpoint folder under the models root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainingMethod {
    /// Plain fine-tuning
    Finetune,
    /// Zero-shot continual learning
    Zscl,
    /// ZSCL with frozen layers
    ZsclFreeze,
    /// ZSCL with orthogonal gradient descent
    ZsclOgd,
}

impl TrainingMethod {
    pub const ALL: [TrainingMethod; 4] = [
        TrainingMethod::Finetune,
        TrainingMethod::Zscl,
        TrainingMethod::ZsclFreeze,
        TrainingMethod::ZsclOgd,
    ];

    /// Identifier used on the wire
    pub fn id(&self) -> &'static str {
        match self {
            Self::Finetune => "finetune",
            Self::Zscl => "zscl",
            Self::ZsclFreeze => "zscl+freeze",
            Self::ZsclOgd => "zscl+ogd",
        }
    }

    /// Folder under the models root holding this method's checkpoints
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Finetune => "finetune",
            Self::Zscl => "zscl",
            Self::ZsclFreeze => "zscl_freeze",
            Self::ZsclOgd => "zscl_ogd",
        }
    }
}

impl FromStr for TrainingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.id() == s)
            .ok_or_else(|| Error::validation(format!("Unknown training method: {}", s)))
    }
}

/// One entry of a "set sequential models" request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialRequest {
    #[serde(rename = "datasetIndex")]
    pub dataset_index: i64,

    #[serde(default)]
    pub dataset: String,

    #[serde(default)]
    pub method: Option<String>,
}

impl SequentialRequest {
    pub fn new(dataset_index: i64, dataset: impl Into<String>, method: Option<&str>) -> Self {
        Self {
            dataset_index,
            dataset: dataset.into(),
            method: method.map(str::to_string),
        }
    }

    /// Whether this entry selects the unmodified base model
    pub fn is_base_model(&self) -> bool {
        self.dataset_index == 0 || normalize(&self.dataset) == normalize(BASE_MODEL_NAME)
    }

    /// Dataset name this entry's index points at, if in range
    pub fn target_dataset(&self) -> Option<&'static str> {
        usize::try_from(self.dataset_index)
            .ok()
            .and_then(|i| SEQUENTIAL_DATASETS.get(i).copied())
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Strategy for finding a dataset's checkpoint inside a method folder
pub trait CheckpointMatcher: Send + Sync {
    /// First checkpoint in `dir` matching `dataset`, if any
    fn find(&self, dir: &Path, dataset: &str) -> Result<Option<PathBuf>>;
}

/// Case-insensitive substring match on file names with a given extension
///
/// Scans only the immediate entries of the folder and takes the first match
/// in directory-listing order.
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    suffix: String,
}

impl SubstringMatcher {
    /// `extension` may be given with or without the leading dot
    pub fn new(extension: &str) -> Self {
        Self {
            suffix: format!(".{}", extension.trim_start_matches('.')),
        }
    }
}

impl Default for SubstringMatcher {
    fn default() -> Self {
        Self::new("pth")
    }
}

impl CheckpointMatcher for SubstringMatcher {
    fn find(&self, dir: &Path, dataset: &str) -> Result<Option<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Checkpoint folder {} does not exist", dir.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let needle = dataset.to_lowercase();

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };

            if name.ends_with(&self.suffix) && name.to_lowercase().contains(&needle) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

/// Checkpoints chosen for the sequential comparison
///
/// Rebuilt from scratch by every resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequentialSelection {
    include_base: bool,
    checkpoints: Vec<CheckpointSlot>,
}

impl SequentialSelection {
    pub fn include_base(&self) -> bool {
        self.include_base
    }

    /// Resolved checkpoints, in resolution order
    pub fn checkpoints(&self) -> &[CheckpointSlot] {
        &self.checkpoints
    }

    pub fn is_empty(&self) -> bool {
        !self.include_base && self.checkpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.include_base = false;
        self.checkpoints.clear();
    }
}

/// Resolves sequential selections against the checkpoint tree
pub struct SequentialResolver {
    models_root: PathBuf,
    matcher: Box<dyn CheckpointMatcher>,
}

impl SequentialResolver {
    pub fn new(models_root: impl Into<PathBuf>, matcher: Box<dyn CheckpointMatcher>) -> Self {
        Self {
            models_root: models_root.into(),
            matcher,
        }
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Replace `selection` with the checkpoints `requests` resolve to
    ///
    /// Each resolved checkpoint is loaded through `cache`. Processing stops at
    /// the first failing entry; entries resolved before it stay in
    /// `selection` and stay loaded. Returns the display names of everything
    /// resolved, in request order.
    pub fn resolve(
        &self,
        requests: &[SequentialRequest],
        cache: &ModelCache,
        selection: &mut SequentialSelection,
    ) -> Result<Vec<String>> {
        if requests.is_empty() {
            return Err(Error::validation("No models specified"));
        }

        selection.clear();
        let mut names = Vec::with_capacity(requests.len());

        for request in requests {
            if request.is_base_model() {
                if !selection.include_base {
                    selection.include_base = true;
                    names.push(BASE_MODEL_NAME.to_string());
                }
                continue;
            }

            let method = match request.method.as_deref() {
                Some(method) => method.parse::<TrainingMethod>()?,
                None => {
                    return Err(Error::validation(format!(
                        "Method required for dataset {}",
                        request.dataset
                    )))
                }
            };

            let dir = self.models_root.join(method.folder());
            let dataset = request.target_dataset();

            let path = match dataset {
                Some(dataset) => self.matcher.find(&dir, dataset)?,
                None => None,
            }
            .ok_or_else(|| {
                Error::not_found(format!(
                    "No checkpoint found for dataset {} with method {}",
                    dataset.unwrap_or(request.dataset.as_str()),
                    method.id()
                ))
            })?;

            if selection.checkpoints.iter().any(|slot| slot.path() == path) {
                debug!("Skipping duplicate selection {}", path.display());
                continue;
            }

            cache.ensure_loaded(&path)?;

            let slot = CheckpointSlot::qualified(path);
            info!("Resolved sequential model {}", slot.display_name());
            names.push(slot.display_name().to_string());
            selection.checkpoints.push(slot);
        }

        Ok(names)
    }
}
