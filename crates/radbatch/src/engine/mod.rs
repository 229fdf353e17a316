//! Extraction engine boundary.
//!
//! The pipeline treats feature extraction as an opaque function from a
//! (volume, mask, parameter set) triple to a mapping of named values. The
//! value shapes an engine can hand back form a small closed set, modeled as
//! [`RawValue`] so normalization is an explicit match instead of runtime
//! type inspection.

pub mod pyradiomics;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::EngineError;
use crate::params::ParameterSet;

/// One un-normalized engine result value.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Plain text (engine version strings, hashes, class names).
    Text(String),
    /// Nested mapping, assumed already serializable.
    Map(serde_json::Map<String, Value>),
    /// Fixed-size tuple of scalars (spacings, bounding boxes).
    Sequence(Vec<Value>),
    /// A single floating-point value.
    Scalar(f64),
    /// Dense numeric array.
    Array(Vec<f64>),
}

impl RawValue {
    /// Classifies a JSON value into its raw shape. Arrays whose elements
    /// are all numeric become [`RawValue::Array`]; any other array is a
    /// [`RawValue::Sequence`]. Booleans and nulls are carried as text.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(map) => Self::Map(map),
            Value::Number(number) => match number.as_f64() {
                Some(scalar) => Self::Scalar(scalar),
                None => Self::Text(number.to_string()),
            },
            Value::Array(items) => {
                let numbers: Option<Vec<f64>> =
                    items.iter().map(Value::as_f64).collect();
                match numbers {
                    Some(values) => Self::Array(values),
                    None => Self::Sequence(items),
                }
            }
            Value::Bool(flag) => Self::Text(flag.to_string()),
            Value::Null => Self::Text("null".to_string()),
        }
    }
}

/// The un-normalized mapping returned by the extraction engine for one item.
pub type RawResult = BTreeMap<String, RawValue>;

/// A feature-extraction engine. Implementations must contain every failure
/// (file load, configuration, computation) in the returned [`EngineError`];
/// nothing here may abort the batch.
pub trait FeatureEngine: Send + Sync {
    fn extract(
        &self,
        volume_path: &Path,
        mask_path: &Path,
        params: &ParameterSet,
    ) -> Result<RawResult, EngineError>;
}
