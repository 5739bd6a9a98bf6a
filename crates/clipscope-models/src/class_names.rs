//! Class-name list persisted as a flat text file

use clipscope_core::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ordered class names backed by a one-name-per-line file
#[derive(Debug, Clone)]
pub struct ClassNameStore {
    path: PathBuf,
    names: Vec<String>,
}

impl ClassNameStore {
    /// Open the store, reading the file if it exists
    ///
    /// A missing file yields an empty list; it is created on the first save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let names = if path.exists() {
            read_names(&path)?
        } else {
            warn!("Class names file {} not found, starting empty", path.display());
            Vec::new()
        };

        Ok(Self { path, names })
    }

    /// Current names, without touching the file
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Re-read the names from the file
    pub fn reload(&mut self) -> Result<&[String]> {
        self.names = read_names(&self.path)?;
        Ok(&self.names)
    }

    /// Overwrite the file with `names`, one per line
    pub fn save(&mut self, names: Vec<String>) -> Result<()> {
        std::fs::write(&self.path, names.join("\n"))?;
        self.names = names.iter().map(|n| n.trim().to_string()).collect();
        info!("Saved {} class names to {}", self.names.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(|line| line.trim().to_string()).collect())
}
