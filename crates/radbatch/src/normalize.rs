//! Result normalization into serialization-safe documents.
//!
//! Engine results mix strings, nested mappings, tuples, scalars, and dense
//! arrays. Persisting them requires a uniform shape: every document field is
//! a string, a nested mapping, or a 64-bit float, and every document leads
//! with an `_ID_` field naming its work item.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::engine::{RawResult, RawValue};

/// Field carrying the work item id in every document.
pub const ID_FIELD: &str = "_ID_";

/// A normalized feature value — the only shapes that reach a sink.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Text(String),
    Table(serde_json::Map<String, Value>),
    Number(f64),
}

/// A uniform document: `_ID_` plus normalized feature fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    features: BTreeMap<String, FeatureValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            features: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FeatureValue) {
        self.features.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.features.get(key)
    }

    pub fn features(&self) -> &BTreeMap<String, FeatureValue> {
        &self.features
    }

    /// Number of feature fields, `_ID_` not counted.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Serialize for Document {
    /// Serializes to a flat JSON object with `_ID_` as the leading field.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.features.len() + 1))?;
        map.serialize_entry(ID_FIELD, &self.id)?;
        for (key, value) in &self.features {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Reduction applied when a dense numeric array must become one float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayPolicy {
    /// Accept only single-element arrays; anything else fails the item.
    #[default]
    Singleton,
    /// Take the first element; an empty array fails the item.
    First,
}

/// Normalization failed for one feature. The fields converted before the
/// failure (at minimum `_ID_`) ride along for diagnostic logging.
#[derive(Debug, Error)]
#[error("Feature '{key}' could not be normalized: {reason}")]
pub struct NormalizeError {
    pub key: String,
    pub reason: String,
    pub partial: Document,
}

/// Normalizes a raw engine result under the default array policy.
pub fn normalize(raw: RawResult, id: &str) -> Result<Document, NormalizeError> {
    normalize_with(raw, id, ArrayPolicy::default())
}

/// Normalizes a raw engine result: seeds `_ID_`, then converts each value
/// by shape — text and mappings copied, sequences rendered to their text
/// form, scalars widened to f64, arrays reduced per `policy`.
pub fn normalize_with(
    raw: RawResult,
    id: &str,
    policy: ArrayPolicy,
) -> Result<Document, NormalizeError> {
    let mut document = Document::new(id);

    for (key, value) in raw {
        let converted = match value {
            RawValue::Text(text) => FeatureValue::Text(text),
            RawValue::Map(map) => FeatureValue::Table(map),
            RawValue::Sequence(items) => FeatureValue::Text(render_sequence(&items)),
            RawValue::Scalar(scalar) => FeatureValue::Number(scalar),
            RawValue::Array(values) => match reduce_array(&values, policy) {
                Ok(scalar) => FeatureValue::Number(scalar),
                Err(reason) => {
                    return Err(NormalizeError {
                        key,
                        reason,
                        partial: document,
                    })
                }
            },
        };
        document.insert(key, converted);
    }

    Ok(document)
}

fn reduce_array(values: &[f64], policy: ArrayPolicy) -> Result<f64, String> {
    match policy {
        ArrayPolicy::Singleton => match values {
            [only] => Ok(*only),
            [] => Err("empty array".to_string()),
            more => Err(format!(
                "array of length {} cannot collapse to one scalar",
                more.len()
            )),
        },
        ArrayPolicy::First => values
            .first()
            .copied()
            .ok_or_else(|| "empty array".to_string()),
    }
}

/// Text form of a fixed tuple, e.g. `(1.0, 2.0, 3.0)`.
fn render_sequence(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(entries: Vec<(&str, RawValue)>) -> RawResult {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    #[test]
    fn test_seeds_id_field() {
        let document = normalize(RawResult::new(), "p1").unwrap();
        assert_eq!(document.id(), "p1");
        assert!(document.is_empty());
    }

    #[test]
    fn test_conversion_table() {
        let mut map = serde_json::Map::new();
        map.insert("binWidth".to_string(), json!(25.0));

        let document = normalize(
            raw(vec![
                ("version", RawValue::Text("3.0.1".to_string())),
                ("settings", RawValue::Map(map.clone())),
                ("spacing", RawValue::Sequence(vec![json!(1.0), json!(1.0)])),
                ("mean", RawValue::Scalar(12.34)),
                ("energy", RawValue::Array(vec![42.0])),
            ]),
            "p1",
        )
        .unwrap();

        assert_eq!(
            document.get("version"),
            Some(&FeatureValue::Text("3.0.1".to_string()))
        );
        assert_eq!(document.get("settings"), Some(&FeatureValue::Table(map)));
        assert_eq!(
            document.get("spacing"),
            Some(&FeatureValue::Text("(1.0, 1.0)".to_string()))
        );
        assert_eq!(document.get("mean"), Some(&FeatureValue::Number(12.34)));
        assert_eq!(document.get("energy"), Some(&FeatureValue::Number(42.0)));
    }

    #[test]
    fn test_sequence_rendering() {
        let document = normalize(
            raw(vec![(
                "bbox",
                RawValue::Sequence(vec![json!(0), json!(10), json!("z")]),
            )]),
            "p1",
        )
        .unwrap();
        assert_eq!(
            document.get("bbox"),
            Some(&FeatureValue::Text("(0, 10, z)".to_string()))
        );
    }

    #[test]
    fn test_singleton_policy_rejects_multi_element_array() {
        let result = normalize(
            raw(vec![("hist", RawValue::Array(vec![1.0, 2.0, 3.0]))]),
            "p1",
        );
        let error = result.unwrap_err();
        assert_eq!(error.key, "hist");
        assert!(error.reason.contains("length 3"));
    }

    #[test]
    fn test_singleton_policy_rejects_empty_array() {
        let result = normalize(raw(vec![("hist", RawValue::Array(vec![]))]), "p1");
        assert!(result.is_err());
    }

    #[test]
    fn test_first_policy_takes_first_element() {
        let document = normalize_with(
            raw(vec![("hist", RawValue::Array(vec![7.0, 8.0]))]),
            "p1",
            ArrayPolicy::First,
        )
        .unwrap();
        assert_eq!(document.get("hist"), Some(&FeatureValue::Number(7.0)));
    }

    #[test]
    fn test_first_policy_rejects_empty_array() {
        let result = normalize_with(
            raw(vec![("hist", RawValue::Array(vec![]))]),
            "p1",
            ArrayPolicy::First,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_error_carries_partial_document() {
        let result = normalize(
            raw(vec![
                ("a_mean", RawValue::Scalar(1.0)),
                ("z_hist", RawValue::Array(vec![1.0, 2.0])),
            ]),
            "p1",
        );
        let error = result.unwrap_err();
        assert_eq!(error.partial.id(), "p1");
        assert_eq!(
            error.partial.get("a_mean"),
            Some(&FeatureValue::Number(1.0))
        );
    }

    #[test]
    fn test_idempotent_without_arrays() {
        let input = raw(vec![
            ("version", RawValue::Text("3.0.1".to_string())),
            ("mean", RawValue::Scalar(12.34)),
        ]);
        let first = normalize(input.clone(), "p1").unwrap();
        let second = normalize(input, "p1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialization_leads_with_id() {
        let mut document = Document::new("p1");
        document.insert("mean", FeatureValue::Number(12.34));

        let text = serde_json::to_string(&document).unwrap();
        assert!(text.starts_with(r#"{"_ID_":"p1""#));
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"_ID_": "p1", "mean": 12.34})
        );
    }
}
