pub mod batch;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod params;
pub mod sink;
pub mod worker;
pub mod worklist;

pub use batch::{
    BatchConfig, BatchError, BatchRun, BatchSummary, ChannelProgress, ItemOutcome, ItemReport,
    NoopProgress, ProgressEvent, ProgressReporter, SkipReason, StoreOutcome,
};
pub use engine::{FeatureEngine, RawResult, RawValue};
pub use engine::pyradiomics::PyradiomicsEngine;
pub use error::{
    EngineError, ParamsError, RadbatchError, Result, StorageError, WorkerError, WorklistError,
};
pub use normalize::{normalize, normalize_with, ArrayPolicy, Document, FeatureValue, NormalizeError};
pub use params::ParameterSet;
pub use sink::{DocumentSink, DocumentStore, FileSink, StoreError};
pub use worker::{BatchExecutor, BatchHandle};
pub use worklist::{WorkItem, Worklist};
