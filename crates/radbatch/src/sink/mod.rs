pub mod file;
pub mod store;

pub use file::FileSink;
pub use store::{DocumentSink, DocumentStore, StoreError};
