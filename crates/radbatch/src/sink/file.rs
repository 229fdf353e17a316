//! Per-item JSON file sink.

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::normalize::Document;

/// Writes one `<id>.json` file per document into a pre-validated output
/// directory. Filenames are deterministic, so re-running a batch overwrites
/// the previous run's document for the same id.
pub struct FileSink {
    output_directory: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn write(&self, document: &Document) -> Result<PathBuf, StorageError> {
        let path = self
            .output_directory
            .join(format!("{}.json", document.id()));
        let bytes = serde_json::to_vec_pretty(document)?;
        std::fs::write(&path, bytes).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}
