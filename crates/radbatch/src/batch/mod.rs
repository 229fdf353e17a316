pub mod config;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::BatchConfig;
pub use error::BatchError;
pub use progress::{
    ChannelProgress, ItemOutcome, ItemReport, NoopProgress, ProgressEvent, ProgressReporter,
    SkipReason, StoreOutcome,
};
pub use runner::{BatchRun, BatchSummary};
