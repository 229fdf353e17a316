use std::path::PathBuf;

use crate::normalize::ArrayPolicy;
use crate::sink::DocumentStore;

use super::error::BatchError;

/// Configuration for one batch run.
///
/// Validity invariant: the output directory exists, and when `use_database`
/// is set, all three database fields are non-empty and the named database
/// and collection exist and are reachable. Checked once by [`validate`],
/// before the batch starts — never re-checked per item.
///
/// [`validate`]: BatchConfig::validate
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub output_directory: PathBuf,
    pub use_database: bool,
    pub connection_string: String,
    pub database: String,
    pub collection: String,
    /// Reduction applied when an engine value is a dense numeric array.
    pub array_policy: ArrayPolicy,
}

impl BatchConfig {
    /// File-only configuration: documents go to the output directory and
    /// nowhere else.
    pub fn file_only(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            use_database: false,
            connection_string: String::new(),
            database: String::new(),
            collection: String::new(),
            array_policy: ArrayPolicy::default(),
        }
    }

    /// Configuration with the document store enabled.
    pub fn with_database(
        output_directory: impl Into<PathBuf>,
        connection_string: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            output_directory: output_directory.into(),
            use_database: true,
            connection_string: connection_string.into(),
            database: database.into(),
            collection: collection.into(),
            array_policy: ArrayPolicy::default(),
        }
    }

    /// Pre-flight validation. Reported synchronously to the caller; a batch
    /// is never started on a configuration that fails here.
    pub fn validate(&self) -> Result<(), BatchError> {
        if !self.output_directory.is_dir() {
            return Err(BatchError::OutputDirectoryMissing(
                self.output_directory.clone(),
            ));
        }

        if self.use_database {
            for (field, value) in [
                ("connection string", &self.connection_string),
                ("database name", &self.database),
                ("collection name", &self.collection),
            ] {
                if value.is_empty() {
                    return Err(BatchError::MissingDatabaseField { field });
                }
            }

            DocumentStore::verify(&self.connection_string, &self.database, &self.collection)
                .map_err(BatchError::DatabaseConnect)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_only_valid() {
        let tmp = TempDir::new().unwrap();
        let config = BatchConfig::file_only(tmp.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_output_directory() {
        let config = BatchConfig::file_only("/nonexistent/output");
        assert!(matches!(
            config.validate(),
            Err(BatchError::OutputDirectoryMissing(_))
        ));
    }

    #[test]
    fn test_empty_database_field() {
        let tmp = TempDir::new().unwrap();
        let config = BatchConfig::with_database(tmp.path(), "mongodb://localhost", "radiomics", "");
        match config.validate() {
            Err(BatchError::MissingDatabaseField { field }) => {
                assert_eq!(field, "collection name");
            }
            other => panic!("Expected MissingDatabaseField, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_connection_string_is_preflight_error() {
        let tmp = TempDir::new().unwrap();
        let config = BatchConfig::with_database(tmp.path(), "http://not-mongo", "db", "col");
        assert!(matches!(
            config.validate(),
            Err(BatchError::DatabaseConnect(_))
        ));
    }
}
