use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadbatchError {
    #[error("Worklist error: {0}")]
    Worklist(#[from] WorklistError),

    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Batch error: {0}")]
    Batch(#[from] crate::batch::BatchError),

    #[error("Document store error: {0}")]
    Store(#[from] crate::sink::StoreError),
}

#[derive(Error, Debug)]
pub enum WorklistError {
    #[error("Failed to read worklist '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write worklist '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed row {line}: {detail}")]
    MalformedRow { line: usize, detail: String },

    #[error("Invalid item id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Duplicate item id '{id}'")]
    DuplicateId { id: String },
}

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Failed to read parameter file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse parameter JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Parameter file must contain a JSON object at the top level")]
    NotAnObject,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Extraction engine not available: {0}")]
    NotAvailable(String),

    #[error("Failed to stage engine parameters: {0}")]
    Parameters(String),

    #[error("Engine execution failed: {0}")]
    Failed(String),

    #[error("Engine produced unusable output: {0}")]
    Output(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("A batch is already in flight")]
    BatchInFlight,

    #[error("Failed to spawn batch thread: {0}")]
    SpawnFailed(String),

    #[error("Batch channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, RadbatchError>;
