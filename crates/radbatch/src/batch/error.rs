use std::path::PathBuf;
use thiserror::Error;

/// Pre-flight failures. These are the only errors that abort before a batch
/// starts; everything per-item is contained by the runner.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Output directory does not exist: {0}")]
    OutputDirectoryMissing(PathBuf),

    #[error("Database use is requested but the {field} field is empty")]
    MissingDatabaseField { field: &'static str },

    #[error("Database pre-flight check failed: {0}")]
    DatabaseConnect(#[source] crate::sink::StoreError),

    #[error("Worklist is empty")]
    EmptyWorklist,
}
