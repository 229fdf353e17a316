//! External document store (MongoDB).
//!
//! The store is an opaque sink: one connection opened at batch start, one
//! `insert_one` per document, closed best-effort at batch end. Pre-flight
//! validation requires the named database and collection to already exist —
//! the pipeline never creates them.

use mongodb::bson;
use mongodb::sync::Client;
use thiserror::Error;

use crate::normalize::Document;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Database '{0}' does not exist")]
    DatabaseMissing(String),

    #[error("Collection '{collection}' does not exist in database '{database}'")]
    CollectionMissing {
        database: String,
        collection: String,
    },

    #[error("Document could not be encoded to BSON: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("Document rejected by store: {0}")]
    Rejected(String),
}

/// A persistence target accepting one normalized document at a time.
pub trait DocumentSink: Send {
    fn insert(&self, document: &Document) -> Result<(), StoreError>;

    /// Best-effort teardown; implementations must not fail.
    fn close(self: Box<Self>);
}

/// Handle to one MongoDB collection, exclusively owned by a single batch
/// run.
pub struct DocumentStore {
    client: Client,
    database: String,
    collection: String,
}

impl DocumentStore {
    /// Connects and verifies that the named database and collection already
    /// exist and are reachable.
    pub fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)?;

        let databases = client.list_database_names(None, None)?;
        if !databases.iter().any(|name| name == database) {
            return Err(StoreError::DatabaseMissing(database.to_string()));
        }

        let collections = client.database(database).list_collection_names(None)?;
        if !collections.iter().any(|name| name == collection) {
            return Err(StoreError::CollectionMissing {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }

        log::info!("Connected to document store {}/{}", database, collection);

        Ok(Self {
            client,
            database: database.to_string(),
            collection: collection.to_string(),
        })
    }

    /// One-shot pre-flight check: connect, verify existence, disconnect.
    pub fn verify(uri: &str, database: &str, collection: &str) -> Result<(), StoreError> {
        Self::connect(uri, database, collection).map(drop)
    }
}

impl DocumentSink for DocumentStore {
    fn insert(&self, document: &Document) -> Result<(), StoreError> {
        let record = bson::to_document(document)?;
        self.client
            .database(&self.database)
            .collection::<bson::Document>(&self.collection)
            .insert_one(record, None)?;
        Ok(())
    }

    fn close(self: Box<Self>) {
        log::debug!(
            "Closing document store connection to {}/{}",
            self.database,
            self.collection
        );
        drop(self);
    }
}
