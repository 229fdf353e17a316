//! pyradiomics subprocess adapter.
//!
//! Invokes the `pyradiomics` executable per item. The parameter set is an
//! override layer: the adapter starts from a configuration with the full
//! feature surface enabled, overlays the user's parameters section by
//! section (a section present in the parameter set replaces the base one,
//! matching how the engine applies a parameter document to an
//! enable-everything state), stages the result to a temp file, and parses
//! the engine's JSON output.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::params::ParameterSet;

use super::{FeatureEngine, RawResult, RawValue};

/// Feature classes enabled before the parameter set is applied.
const ALL_FEATURE_CLASSES: &[&str] = &[
    "firstorder",
    "glcm",
    "gldm",
    "glrlm",
    "glszm",
    "ngtdm",
    "shape",
    "shape2D",
];

pub struct PyradiomicsEngine {
    binary: String,
}

impl PyradiomicsEngine {
    pub fn new() -> Self {
        Self {
            binary: "pyradiomics".to_string(),
        }
    }

    /// Uses an explicit executable path instead of resolving `pyradiomics`
    /// from `PATH`.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probes whether the engine executable can be launched.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Full-feature base configuration overlaid with the parameter set.
    /// Top-level sections from the parameter set replace the base sections;
    /// absent sections keep the enable-everything default.
    fn effective_config(&self, params: &ParameterSet) -> Value {
        let mut classes = serde_json::Map::new();
        for class in ALL_FEATURE_CLASSES {
            classes.insert((*class).to_string(), Value::Null);
        }

        let mut config = serde_json::Map::new();
        config.insert("featureClass".to_string(), Value::Object(classes));
        config.insert(
            "imageType".to_string(),
            serde_json::json!({ "Original": {} }),
        );

        if let Some(overlay) = params.as_value().as_object() {
            for (section, value) in overlay {
                config.insert(section.clone(), value.clone());
            }
        }

        Value::Object(config)
    }
}

impl Default for PyradiomicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEngine for PyradiomicsEngine {
    fn extract(
        &self,
        volume_path: &Path,
        mask_path: &Path,
        params: &ParameterSet,
    ) -> Result<RawResult, EngineError> {
        let config = self.effective_config(params);

        // The engine reads its configuration from a file; JSON is a valid
        // subset of the YAML it expects.
        let mut param_file = tempfile::Builder::new()
            .prefix("radbatch-params-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut param_file, &config)
            .map_err(|e| EngineError::Parameters(e.to_string()))?;
        param_file.flush()?;

        debug!(
            volume = %volume_path.display(),
            mask = %mask_path.display(),
            "running {}", self.binary
        );

        let output = Command::new(&self.binary)
            .arg(volume_path)
            .arg(mask_path)
            .arg("--param")
            .arg(param_file.path())
            .args(["--format", "json"])
            .output();

        match output {
            Ok(out) if out.status.success() => parse_output(&out.stdout),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(EngineError::Failed(truncate(stderr.trim(), 500)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotAvailable(format!(
                    "{} not found (install with: pip install pyradiomics)",
                    self.binary
                )))
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

/// Parses the engine's JSON output into a raw result. The CLI emits either
/// a single record object or a one-record array.
fn parse_output(stdout: &[u8]) -> Result<RawResult, EngineError> {
    let value: Value = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Output(format!("invalid JSON: {e}")))?;

    let record = match value {
        Value::Array(mut items) if !items.is_empty() => items.remove(0),
        Value::Array(_) => {
            return Err(EngineError::Output("empty result array".to_string()));
        }
        other => other,
    };

    match record {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, RawValue::from_json(value)))
            .collect()),
        other => Err(EngineError::Output(format!(
            "expected a JSON object of feature values, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}
