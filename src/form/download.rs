//! Saving filled documents

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// `<stem>_filled.pdf`, where only a trailing lowercase `.pdf` is treated as the extension
pub fn filled_file_name(original: &str) -> String {
    match original.strip_suffix(".pdf") {
        Some(stem) => format!("{}_filled.pdf", stem),
        None => format!("{}_filled.pdf", original),
    }
}

/// Where downloaded bytes end up
pub trait SaveTarget {
    /// Persist `bytes` under `file_name` and return the location written
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Saves into a directory on the local file system
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveTarget for DirectoryTarget {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        // Only the final component is honored
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::PathAccessDenied {
                path: file_name.to_string(),
            })?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved filled PDF");
        Ok(path)
    }
}
