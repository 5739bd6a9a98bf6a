//! Static checkpoint registry and the activation vector over it

use clipscope_core::{Error, Result};
use std::path::{Path, PathBuf};

/// One fine-tuned model variant, identified by its weights file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSlot {
    path: PathBuf,
    display_name: String,
}

impl CheckpointSlot {
    /// Slot named after the file's basename
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = file_name(&path);
        Self { path, display_name }
    }

    /// Slot named `{containing folder}/{basename}`
    pub fn qualified(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = file_name(&path);
        let display_name = match path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
        {
            Some(folder) => format!("{}/{}", folder, file),
            None => file,
        };
        Self { path, display_name }
    }

    /// Filesystem location of the serialized weights
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name shown to the operator and used as the result key
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Ordered table of checkpoint slots fixed at configuration time
#[derive(Debug, Clone, Default)]
pub struct CheckpointRegistry {
    slots: Vec<CheckpointSlot>,
}

impl CheckpointRegistry {
    pub fn new(slots: Vec<CheckpointSlot>) -> Self {
        Self { slots }
    }

    /// Registry of basename-named slots
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(paths.into_iter().map(CheckpointSlot::new).collect())
    }

    pub fn slots(&self) -> &[CheckpointSlot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&CheckpointSlot> {
        self.slots.get(index)
    }

    pub fn display_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.display_name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Which registry slots take part in a basic prediction
///
/// Always exactly as long as the registry it was validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationVector {
    flags: Vec<bool>,
}

impl ActivationVector {
    /// All slots inactive
    pub fn inactive(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// Validate raw 0/1 values against the expected registry length
    pub fn from_flags(values: &[i64], expected_len: usize) -> Result<Self> {
        if values.len() != expected_len {
            return Err(Error::validation(format!(
                "Expected array of length {}, got {}",
                expected_len,
                values.len()
            )));
        }

        if !values.iter().all(|v| *v == 0 || *v == 1) {
            return Err(Error::validation("Array must contain only 0 or 1 values"));
        }

        Ok(Self {
            flags: values.iter().map(|v| *v == 1).collect(),
        })
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Indices of active slots, in registry order
    pub fn active_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn any_active(&self) -> bool {
        self.flags.iter().any(|a| *a)
    }

    /// Wire form: one 0/1 integer per slot
    pub fn to_ints(&self) -> Vec<u8> {
        self.flags.iter().map(|a| u8::from(*a)).collect()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
