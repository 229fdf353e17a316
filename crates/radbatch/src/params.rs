//! Engine parameter sets.
//!
//! The extraction engine is configured by an opaque JSON document. The
//! pipeline never interprets its contents — the only structural rule is
//! that the top level is a JSON object, so it can be re-serialized into the
//! engine's configuration format.

use std::path::Path;

use serde_json::{json, Value};

use crate::error::ParamsError;

/// An opaque, engine-specific configuration mapping, loaded once before a
/// batch starts and shared read-only across all items in that batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    value: Value,
}

impl ParameterSet {
    /// Wraps an already-parsed JSON value, rejecting anything that is not
    /// an object at the top level.
    pub fn from_value(value: Value) -> Result<Self, ParamsError> {
        if !value.is_object() {
            return Err(ParamsError::NotAnObject);
        }
        Ok(Self { value })
    }

    /// Loads a parameter file wholesale.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParamsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ParamsError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ParamsError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }
}

impl Default for ParameterSet {
    /// The built-in configuration used when no parameter file is loaded:
    /// bin width 25.0 with symmetrical GLCM, the full set of feature
    /// classes, under the original (unfiltered) image type only.
    fn default() -> Self {
        Self {
            value: json!({
                "setting": {
                    "binWidth": 25.0,
                    "symmetricalGLCM": true
                },
                "featureClass": {
                    "firstorder": null,
                    "glcm": null,
                    "gldm": null,
                    "glrlm": null,
                    "glszm": null,
                    "ngtdm": null,
                    "shape": null,
                    "shape2D": null
                },
                "imageType": {
                    "Original": {}
                }
            }),
        }
    }
}
