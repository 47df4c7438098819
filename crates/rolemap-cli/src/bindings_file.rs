//! Binding persistence
//!
//! The engine only exports and imports [`BindingSnapshot`]s; this module is
//! the storage side, a pretty-printed JSON file.

use rolemap_core::BindingSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BindingFileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// On-disk binding file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingFile {
    /// Version of the file format
    #[serde(default = "default_version")]
    pub version: String,
    /// When this was saved (RFC 3339)
    #[serde(default)]
    pub saved_at: Option<String>,
    /// Whether the bindings should be applied when loaded
    #[serde(default = "default_true")]
    pub apply_on_load: bool,
    #[serde(default)]
    pub roles: BindingSnapshot,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BindingFile {
    fn default() -> Self {
        Self::new(BindingSnapshot::default())
    }
}

impl BindingFile {
    pub fn new(roles: BindingSnapshot) -> Self {
        Self {
            version: default_version(),
            saved_at: None,
            apply_on_load: true,
            roles,
        }
    }

    /// Load a binding file
    pub fn from_file(path: &Path) -> Result<Self, BindingFileError> {
        let content = std::fs::read_to_string(path)?;
        let file: BindingFile = serde_json::from_str(&content)?;
        Ok(file)
    }

    /// Load a binding file, or an empty one if it doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self, BindingFileError> {
        if path.exists() {
            let file = Self::from_file(path)?;
            info!(path = %path.display(), entries = file.roles.len(), "Loaded bindings");
            Ok(file)
        } else {
            info!(path = %path.display(), "Binding file not found, starting empty");
            Ok(Self::default())
        }
    }

    /// Stamp the save time and write the file
    pub fn save(&mut self, path: &Path) -> Result<(), BindingFileError> {
        self.saved_at = Some(chrono::Utc::now().to_rfc3339());
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!(path = %path.display(), entries = self.roles.len(), "Saved bindings");
        Ok(())
    }
}
