//! Manual form path: configuration files and hand-built scenes.
//!
//! Besides CSV import, records can be authored one form at a time. A form is
//! driven by a [`FormSchema`]: it starts from the definitions' default values,
//! the user edits them, and on commit text addons are attached and every value
//! is checked against its definition.
//!
//! - [`build_config`] - The flat record written to `config.json`
//! - [`build_scene`] - A scene form plus one form per object

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{FieldKind, FormEntryDefinition, FormSchema, ObjectRecord, SceneRecord};
use crate::registry::check_value;
use crate::transform::decoder::DecodeOptions;

/// A form value that does not satisfy its definition.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FieldError {
    pub key: String,
    pub message: String,
}

/// Committed record plus any field errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormOutcome {
    pub record: Map<String, Value>,
    pub errors: Vec<FieldError>,
}

impl FormOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Map<String, Value>, Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(self.record)
        } else {
            Err(self.errors)
        }
    }
}

/// Initial form values: every definition's `defaultValue`, in schema order.
pub fn default_values(schema: &FormSchema) -> Map<String, Value> {
    schema
        .iter()
        .filter_map(|fed| fed.default_value().map(|v| (fed.key.clone(), v)))
        .collect()
}

/// Commit submitted values against a schema.
///
/// Missing values fall back to the definition's default. Values for keys the
/// schema does not know are dropped.
pub fn apply_form(schema: &FormSchema, values: &Map<String, Value>) -> FormOutcome {
    let mut outcome = FormOutcome::default();

    for fed in schema {
        let value = values
            .get(&fed.key)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| fed.default_value());

        let value = match &fed.kind {
            FieldKind::Text(_) => Some(commit_text(fed, value)),
            _ => value,
        };

        outcome.errors.extend(check_value(fed, value.as_ref()).into_iter().map(|message| {
            FieldError { key: fed.key.clone(), message }
        }));

        if let Some(value) = value {
            outcome.record.insert(fed.key.clone(), value);
        }
    }

    outcome
}

/// Attach `addonBefore` / `addonAfter` text; empty input stays empty.
fn commit_text(fed: &FormEntryDefinition, value: Option<Value>) -> Value {
    let text = match &fed.kind {
        FieldKind::Text(text) => text,
        _ => return value.unwrap_or(Value::Null),
    };

    match value {
        Some(Value::String(s)) if !s.is_empty() => {
            let before = text.addon_before.as_ref().map_or("", |a| a.text.as_str());
            let after = text.addon_after.as_ref().map_or("", |a| a.text.as_str());
            Value::String(format!("{}{}{}", before, s, after))
        }
        None | Some(Value::String(_)) => Value::String(String::new()),
        Some(other) => other,
    }
}

/// Build the configuration-file record from submitted values.
pub fn build_config(
    schema: &FormSchema,
    values: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<FieldError>> {
    apply_form(schema, values).into_result()
}

/// Build a scene from a scene form and one form per object.
///
/// The number-of-objects field is consumed: it must be an integer in
/// `1..=max_objects` and match the number of object forms supplied.
pub fn build_scene(
    scene_schema: &FormSchema,
    object_schema: &FormSchema,
    scene_values: &Map<String, Value>,
    object_values: &[Map<String, Value>],
    options: &DecodeOptions,
) -> Result<SceneRecord, Vec<FieldError>> {
    let FormOutcome { mut record, mut errors } = apply_form(scene_schema, scene_values);

    let key = options.num_objects_key.as_str();
    let count = match record.shift_remove(key) {
        None => {
            errors.push(FieldError {
                key: key.to_string(),
                message: format!(
                    "No `{}` field. This field indicates the number of objects to be created.",
                    key
                ),
            });
            None
        }
        Some(value) => {
            let count = value
                .as_u64()
                .map(|n| n as usize)
                .filter(|n| (1..=options.max_objects).contains(n));
            if count.is_none() {
                errors.push(FieldError {
                    key: key.to_string(),
                    message: format!(
                        "You can only have 1 - {} objects, but you want {}.",
                        options.max_objects, value
                    ),
                });
            }
            count
        }
    };

    if let Some(count) = count {
        if object_values.len() != count {
            errors.push(FieldError {
                key: "objects".to_string(),
                message: format!(
                    "Please finish creating all objects: expected {}, got {}.",
                    count,
                    object_values.len()
                ),
            });
        }
    }

    let objects = object_values
        .iter()
        .take(count.unwrap_or(0))
        .enumerate()
        .map(|(i, values)| {
            let outcome = apply_form(object_schema, values);
            errors.extend(outcome.errors.into_iter().map(|e| FieldError {
                key: format!("objects.{}.{}", i + 1, e.key),
                message: format!("Object {}: {}", i + 1, e.message),
            }));
            ObjectRecord { obj_num: i + 1, fields: outcome.record }
        })
        .collect();

    if errors.is_empty() {
        Ok(SceneRecord { fields: record, objects })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_schema() -> FormSchema {
        serde_json::from_value(json!([
            { "key": "subjNum", "label": "Subject Number", "type": "number", "defaultValue": 1, "min": 1 },
            { "key": "subjSex", "label": "Subject Sex", "type": "select", "defaultValue": "male",
              "options": { "male": "Male", "female": "Female" } },
            { "key": "trialFile", "label": "Trial file", "type": "text", "defaultValue": "config", "addonAfter": ".json" },
            { "key": "prefixed", "label": "Prefixed", "type": "text", "required": false,
              "addonBefore": { "text": "run_", "display": true } },
            { "key": "coordinates", "label": "Coordinates", "type": "list", "listSize": 3,
              "itemType": "number", "defaultValue": [1, 2, 3] }
        ]))
        .unwrap()
    }

    fn object_schema() -> FormSchema {
        serde_json::from_value(json!([
            { "key": "objType", "label": "Object type", "type": "select", "options": { "car": "Car" } }
        ]))
        .unwrap()
    }

    fn scene_schema() -> FormSchema {
        serde_json::from_value(json!([
            { "key": "sceneName", "label": "Scene name", "type": "text" },
            { "key": "numObjects", "label": "Number of objects", "type": "number", "defaultValue": 1 }
        ]))
        .unwrap()
    }

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_values_in_schema_order() {
        let defaults = default_values(&config_schema());
        let keys: Vec<&String> = defaults.keys().collect();
        assert_eq!(keys, vec!["subjNum", "subjSex", "trialFile", "coordinates"]);
    }

    #[test]
    fn test_config_from_defaults_applies_addons() {
        let config = build_config(&config_schema(), &Map::new()).unwrap();

        assert_eq!(config["trialFile"], "config.json");
        assert_eq!(config["prefixed"], "");
        assert_eq!(config["coordinates"], json!([1, 2, 3]));
    }

    #[test]
    fn test_config_with_submitted_values() {
        let config = build_config(
            &config_schema(),
            &values(json!({ "subjNum": 7, "prefixed": "a", "unknown": true })),
        )
        .unwrap();

        assert_eq!(config["subjNum"], 7);
        assert_eq!(config["prefixed"], "run_a");
        assert!(!config.contains_key("unknown"));
    }

    #[test]
    fn test_config_errors_name_their_field() {
        let errors = build_config(
            &config_schema(),
            &values(json!({ "subjNum": 0, "subjSex": "other", "coordinates": [1, 2] })),
        )
        .unwrap_err();

        let keys: Vec<&str> = errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["subjNum", "subjSex", "coordinates"]);
    }

    #[test]
    fn test_build_scene_numbers_objects() {
        let scene = build_scene(
            &scene_schema(),
            &object_schema(),
            &values(json!({ "sceneName": "room1", "numObjects": 2 })),
            &[values(json!({ "objType": "car" })), values(json!({ "objType": "car" }))],
            &DecodeOptions::default(),
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&scene).unwrap(),
            json!({
                "sceneName": "room1",
                "objects": [{ "objNum": 1, "objType": "car" }, { "objNum": 2, "objType": "car" }]
            })
        );
    }

    #[test]
    fn test_build_scene_requires_all_objects() {
        let errors = build_scene(
            &scene_schema(),
            &object_schema(),
            &values(json!({ "sceneName": "room1", "numObjects": 2 })),
            &[values(json!({ "objType": "car" }))],
            &DecodeOptions::default(),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "objects");
    }

    #[test]
    fn test_build_scene_object_count_range() {
        let errors = build_scene(
            &scene_schema(),
            &object_schema(),
            &values(json!({ "sceneName": "room1", "numObjects": 5 })),
            &[],
            &DecodeOptions::default(),
        )
        .unwrap_err();

        assert!(errors[0].message.contains("1 - 4 objects"));
    }

    #[test]
    fn test_build_scene_prefixes_object_errors() {
        let errors = build_scene(
            &scene_schema(),
            &object_schema(),
            &values(json!({ "sceneName": "room1" })),
            &[values(json!({ "objType": "plane" }))],
            &DecodeOptions::default(),
        )
        .unwrap_err();

        assert_eq!(errors[0].key, "objects.1.objType");
        assert!(errors[0].message.starts_with("Object 1: "));
    }
}
