//! JSON import/export of the prototype store.
//!
//! Written as `{ "<id>": { "vector": [...], "sampleCount": n } }`. Reads also
//! accept the legacy shape `{ "<id>": [...] }`, counted as a single sample.

use crate::store::PrototypeStore;
use crate::types::{FeatureVector, Prototype};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object mapping identifiers to prototypes, got {0}")]
    NotAnObject(&'static str),
    #[error("identifiers must not be empty")]
    EmptyIdentifier,
    #[error("entry {identifier} is not a prototype: {reason}")]
    InvalidEntry { identifier: String, reason: String },
}

/// Either on-disk shape of one prototype.
#[derive(Deserialize)]
#[serde(untagged)]
enum PrototypeRecord {
    Extended {
        vector: Vec<f32>,
        #[serde(rename = "sampleCount")]
        sample_count: u32,
    },
    Legacy(Vec<f32>),
}

impl From<PrototypeRecord> for Prototype {
    fn from(record: PrototypeRecord) -> Self {
        match record {
            PrototypeRecord::Extended {
                vector,
                sample_count,
            } => Prototype {
                vector: FeatureVector::new(vector),
                sample_count,
            },
            PrototypeRecord::Legacy(values) => Prototype {
                vector: FeatureVector::new(values),
                sample_count: 1,
            },
        }
    }
}

/// Outcome of an import, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: Vec<String>,
    /// Subset of `imported` that replaced an existing prototype.
    pub overwritten: Vec<String>,
}

fn records(store: &PrototypeStore) -> IndexMap<&str, &Prototype> {
    store.iter().collect()
}

/// Store contents as a JSON object, in store order.
///
/// Goes through the same text form as [`export_pretty`], so each `f32` is
/// carried as its shortest decimal rather than its widened `f64` value.
pub fn export(store: &PrototypeStore) -> Result<Value, ExchangeError> {
    let text = serde_json::to_string(&records(store))?;
    Ok(serde_json::from_str(&text)?)
}

/// Pretty-printed export, with `f32` values written in their shortest form.
pub fn export_pretty(store: &PrototypeStore) -> Result<String, ExchangeError> {
    Ok(serde_json::to_string_pretty(&records(store))?)
}

/// Dated default name for an export file, e.g. `prototypes_2024-05-01.json`.
pub fn default_export_file_name(date: NaiveDate) -> String {
    format!("prototypes_{}.json", date.format("%Y-%m-%d"))
}

/// Overwrite-merge `value` into `store`.
///
/// Every entry is decoded before any is applied, so a rejected import leaves
/// the store unchanged. Vector dimensions are not checked here.
pub fn import(store: &mut PrototypeStore, value: &Value) -> Result<ImportReport, ExchangeError> {
    let object = value
        .as_object()
        .ok_or_else(|| ExchangeError::NotAnObject(json_kind(value)))?;

    let mut decoded = Vec::with_capacity(object.len());
    for (identifier, entry) in object {
        if identifier.is_empty() {
            return Err(ExchangeError::EmptyIdentifier);
        }
        let record = PrototypeRecord::deserialize(entry).map_err(|e| ExchangeError::InvalidEntry {
            identifier: identifier.clone(),
            reason: e.to_string(),
        })?;
        let prototype = Prototype::from(record);
        if prototype.sample_count == 0 {
            return Err(ExchangeError::InvalidEntry {
                identifier: identifier.clone(),
                reason: "sampleCount must be at least 1".into(),
            });
        }
        decoded.push((identifier.as_str(), prototype));
    }

    let mut report = ImportReport::default();
    for (identifier, prototype) in decoded {
        if store.insert(identifier, prototype).is_some() {
            report.overwritten.push(identifier.to_string());
        }
        report.imported.push(identifier.to_string());
    }

    if report.overwritten.is_empty() {
        tracing::info!(count = report.imported.len(), "prototypes imported");
    } else {
        tracing::warn!(
            count = report.imported.len(),
            overwritten = ?report.overwritten,
            "prototypes imported, existing entries overwritten"
        );
    }
    Ok(report)
}

pub fn import_str(store: &mut PrototypeStore, json: &str) -> Result<ImportReport, ExchangeError> {
    let value: Value = serde_json::from_str(json)?;
    import(store, &value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_store() -> PrototypeStore {
        let mut store = PrototypeStore::new();
        store
            .merge("Ana", FeatureVector::new(vec![0.0, -0.5, 1.25, 3.0]), 3)
            .unwrap();
        store
            .merge("Luis", FeatureVector::new(vec![0.1, 0.2, 0.3, 0.4]), 45)
            .unwrap();
        store
    }

    #[test]
    fn test_export_shape() {
        let value = export(&sample_store()).unwrap();
        assert_eq!(value["Ana"]["sampleCount"], json!(3));
        assert_eq!(value["Ana"]["vector"], json!([0.0, -0.5, 1.25, 3.0]));
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["Ana", "Luis"]);
    }

    #[test]
    fn test_export_numbers_match_pretty() {
        let store = sample_store();
        let value = export(&store).unwrap();
        assert_eq!(value["Luis"]["vector"], json!([0.1, 0.2, 0.3, 0.4]));

        let compact = serde_json::to_string(&value).unwrap();
        assert!(compact.contains("[0.1,0.2,0.3,0.4]"), "{compact}");
        let pretty: Value = serde_json::from_str(&export_pretty(&store).unwrap()).unwrap();
        assert_eq!(pretty, value);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let original = sample_store();
        let text = export_pretty(&original).unwrap();
        let mut restored = PrototypeStore::new();
        let report = import_str(&mut restored, &text).unwrap();

        assert_eq!(report.imported, vec!["Ana", "Luis"]);
        assert!(report.overwritten.is_empty());
        assert_eq!(restored, original);
        assert_eq!(
            restored.identifiers().collect::<Vec<_>>(),
            original.identifiers().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_import_legacy_array() {
        let mut store = PrototypeStore::new();
        import(&mut store, &json!({ "Ana": [0.5, 0.25] })).unwrap();
        let p = store.get("Ana").unwrap();
        assert_eq!(p.vector.values, vec![0.5, 0.25]);
        assert_eq!(p.sample_count, 1);
    }

    #[test]
    fn test_import_overwrites_without_aggregating() {
        let mut store = sample_store();
        let report = import(
            &mut store,
            &json!({
                "Ana": { "vector": [9.0, 9.0, 9.0, 9.0], "sampleCount": 2 },
                "Eva": [1.0, 1.0, 1.0, 1.0]
            }),
        )
        .unwrap();

        assert_eq!(report.overwritten, vec!["Ana"]);
        assert_eq!(report.imported.len(), 2);
        let ana = store.get("Ana").unwrap();
        assert_eq!(ana.vector.values, vec![9.0; 4]);
        assert_eq!(ana.sample_count, 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_import_rejects_non_object() {
        let mut store = sample_store();
        let before = store.clone();
        for bad in [json!([1, 2, 3]), json!("Ana"), json!(null), json!(4)] {
            assert!(matches!(import(&mut store, &bad), Err(ExchangeError::NotAnObject(_))));
        }
        assert!(matches!(import_str(&mut store, "{not json"), Err(ExchangeError::Json(_))));
        assert_eq!(store, before);
    }

    #[test]
    fn test_import_is_atomic_on_bad_entry() {
        let mut store = sample_store();
        let before = store.clone();
        let result = import(
            &mut store,
            &json!({
                "Ana": [7.0, 7.0, 7.0, 7.0],
                "Broken": { "vector": "nope" }
            }),
        );
        assert!(matches!(
            result,
            Err(ExchangeError::InvalidEntry { ref identifier, .. }) if identifier == "Broken"
        ));
        assert_eq!(store, before);
        assert_eq!(store.get("Ana").unwrap().sample_count, 3);
    }

    #[test]
    fn test_import_does_not_check_dimensions() {
        let mut store = sample_store();
        import(&mut store, &json!({ "Short": [1.0] })).unwrap();
        assert_eq!(store.get("Short").unwrap().vector.len(), 1);
    }

    #[test]
    fn test_default_export_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(default_export_file_name(date), "prototypes_2024-05-01.json");
    }
}
