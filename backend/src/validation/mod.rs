//! Form schema validation.
//!
//! A schema file is experimenter-authored JSON, so it is checked entry by
//! entry before it is allowed to replace the active schema.
//!
//! # Validation Steps
//!
//! 1. The document must be a JSON array ([`parse_schema`] checks this and
//!    reports [`SchemaError::NotAList`] before [`validate`] runs)
//! 2. Every entry is checked for `key`, `label`, `tooltip` and its
//!    type-specific attributes (see [`crate::registry`])
//! 3. Keys repeated later in the list are flagged on the later entry
//!
//! All entries are always checked; diagnostics carry the entry index so a UI
//! can highlight the offending definition.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trialforge::validation::{parse_schema, validate};
//!
//! let doc = json!([
//!     { "key": "sceneName", "label": "Scene name", "type": "text" },
//!     { "key": "sceneName", "label": "Scene name", "type": "text" }
//! ]);
//!
//! let diagnostics = validate(doc.as_array().unwrap());
//! assert_eq!(diagnostics[0].index, 1);
//! assert!(parse_schema(&doc).is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::models::FormSchema;
use crate::registry::validate_definition_shape;

/// Diagnostics for one schema entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDiagnostic {
    /// Position of the entry in the schema.
    pub index: usize,
    pub messages: Vec<String>,
}

/// Validate every entry of a schema document.
///
/// Returns an empty list when the schema is valid; otherwise one diagnostic
/// per faulty entry, in schema order.
pub fn validate(entries: &[Value]) -> Vec<EntryDiagnostic> {
    let keys: Vec<Option<&str>> = entries
        .iter()
        .map(|e| e.get("key").and_then(Value::as_str))
        .collect();

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let mut messages = validate_entry(entry);

            if let Some(key) = keys[index] {
                let first = keys.iter().position(|k| *k == Some(key));
                if first != Some(index) {
                    messages.push(format!("`{}` is a duplicate key", key));
                }
            }

            if messages.is_empty() {
                None
            } else {
                Some(EntryDiagnostic { index, messages })
            }
        })
        .collect()
}

/// Quick check: true when [`validate`] finds nothing.
pub fn is_valid(entries: &[Value]) -> bool {
    validate(entries).is_empty()
}

fn validate_entry(entry: &Value) -> Vec<String> {
    let obj = match entry.as_object() {
        Some(obj) => obj,
        None => return vec!["Form Entry Definition must be an object.".to_string()],
    };

    let mut messages = Vec::new();

    if !is_non_empty_string(obj.get("key")) {
        messages.push("Must contain `key`, which should be a non-empty string.".to_string());
    }

    if !is_non_empty_string(obj.get("label")) {
        messages.push("Must contain `label`, which should be a non-empty string.".to_string());
    }

    if obj.get("tooltip").is_some_and(|t| !t.is_string()) {
        messages.push("`tooltip` must be a string.".to_string());
    }

    if obj.get("required").is_some_and(|r| !r.is_boolean()) {
        messages.push("`required` must be `true` or `false`.".to_string());
    }

    messages.extend(validate_definition_shape(obj));
    messages
}

fn is_non_empty_string(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

/// Validate a schema document and convert it to a typed [`FormSchema`].
///
/// This is the import path: a document that is not a list is a
/// [`SchemaError::NotAList`]; faulty entries give
/// [`SchemaError::InvalidEntries`] with every diagnostic.
pub fn parse_schema(doc: &Value) -> Result<FormSchema, SchemaError> {
    let entries = doc.as_array().ok_or(SchemaError::NotAList)?;

    let diagnostics = validate(entries);
    if !diagnostics.is_empty() {
        return Err(SchemaError::InvalidEntries(diagnostics));
    }

    Ok(serde_json::from_value(doc.clone())?)
}

/// Parse schema JSON text, then [`parse_schema`] it.
pub fn load_schema(content: &str) -> Result<FormSchema, SchemaError> {
    let doc: Value = serde_json::from_str(content)?;
    parse_schema(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene_schema() -> Value {
        json!([
            { "key": "sceneName", "label": "Scene name", "type": "text", "defaultValue": "name" },
            { "key": "corrAns", "label": "Correct answer", "type": "number", "defaultValue": 1 },
            { "key": "playSound", "label": "Play sound", "type": "switch", "defaultValue": false },
            { "key": "soundFile", "label": "Sound file", "type": "text", "addonAfter": ".json" },
            { "key": "numObjects", "label": "Number of objects", "type": "number", "defaultValue": 1 }
        ])
    }

    #[test]
    fn test_valid_schema() {
        let doc = scene_schema();
        assert!(is_valid(doc.as_array().unwrap()));

        let schema = parse_schema(&doc).unwrap();
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.labels()[4], "Number of objects");
    }

    #[test]
    fn test_duplicate_key_flags_later_entry() {
        let doc = json!([
            { "key": "x", "label": "First", "type": "switch" },
            { "key": "y", "label": "Other", "type": "switch" },
            { "key": "x", "label": "Second", "type": "switch" }
        ]);
        let diagnostics = validate(doc.as_array().unwrap());

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].index, 2);
        assert_eq!(diagnostics[0].messages, vec!["`x` is a duplicate key".to_string()]);
    }

    #[test]
    fn test_all_entries_checked_in_order() {
        let doc = json!([
            { "label": "No key", "type": "number" },
            { "key": "ok", "label": "Fine", "type": "number" },
            { "key": "bad", "label": "", "type": "select", "options": {} },
            "not an object"
        ]);
        let diagnostics = validate(doc.as_array().unwrap());

        let indices: Vec<usize> = diagnostics.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 2, 3]);
        assert_eq!(diagnostics[1].messages.len(), 2);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let doc = json!([
            { "key": 1, "label": "A", "type": "list", "listSize": 9 },
            { "key": "b", "label": "B", "type": "switch", "defaultValue": "yes", "tooltip": 4 }
        ]);
        let entries = doc.as_array().unwrap();
        assert_eq!(validate(entries), validate(entries));
    }

    #[test]
    fn test_not_a_list() {
        let result = parse_schema(&json!({ "key": "x" }));
        assert!(matches!(result, Err(SchemaError::NotAList)));
    }

    #[test]
    fn test_invalid_entries_error() {
        let result = load_schema(r#"[{ "key": "x", "label": "X", "type": "switch", "defaultValue": 1 }]"#);
        match result {
            Err(SchemaError::InvalidEntries(diagnostics)) => {
                assert_eq!(diagnostics.len(), 1);
                assert!(diagnostics[0].messages[0].contains("switch"));
            }
            other => panic!("expected invalid entries, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_text() {
        assert!(matches!(load_schema("[{"), Err(SchemaError::Json(_))));
    }
}
