//! Domain models for schema-driven scene authoring.
//!
//! This module contains the data structures shared by every stage:
//!
//! - [`FormEntryDefinition`] - One schema field (key, label, type, constraints)
//! - [`FieldKind`] - Per-type attributes, one variant per [`FieldType`]
//! - [`FormSchema`] - Ordered, key-unique list of definitions
//! - [`SceneRecord`] / [`ObjectRecord`] - Decoded or form-built records
//! - [`TrialFile`] / [`TrialEntry`] - The assembled output document
//!
//! Wire names follow the schema files written by experimenters
//! (`defaultValue`, `listSize`, `itemType`, lowercase type tags).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum number of object blocks a scene row can carry.
pub const MAX_OBJECTS: usize = 4;

/// Maximum `listSize` of a list entry.
pub const MAX_LIST_SIZE: usize = 4;

// =============================================================================
// Field Types
// =============================================================================

/// The five supported field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Text,
    Switch,
    Select,
    List,
}

impl FieldType {
    pub const ALL: [FieldType; 5] = [
        FieldType::Number,
        FieldType::Text,
        FieldType::Switch,
        FieldType::Select,
        FieldType::List,
    ];

    /// Parse a wire tag (`"number"`, `"text"`, ...).
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Text => "text",
            FieldType::Switch => "switch",
            FieldType::Select => "select",
            FieldType::List => "list",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element type allowed inside a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListItemType {
    Number,
    Text,
    Switch,
}

impl ListItemType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "number" => Some(Self::Number),
            "text" => Some(Self::Text),
            "switch" => Some(Self::Switch),
            _ => None,
        }
    }

    /// JSON scalar type name expected for list elements.
    pub fn scalar_name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Text => "string",
            Self::Switch => "boolean",
        }
    }

    /// Whether `value` has this item type's scalar JSON type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Text => value.is_string(),
            Self::Switch => value.is_boolean(),
        }
    }
}

// =============================================================================
// Addons
// =============================================================================

/// Fixed literal attached before or after a text input on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AddonRepr")]
pub struct Addon {
    pub text: String,
    pub display: bool,
}

impl Addon {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), display: true }
    }
}

/// Accepts the legacy `"addonAfter": ".json"` shape as well as `{ text, display }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AddonRepr {
    Legacy(String),
    Full {
        text: String,
        #[serde(default = "default_true")]
        display: bool,
    },
}

impl From<AddonRepr> for Addon {
    fn from(repr: AddonRepr) -> Self {
        match repr {
            AddonRepr::Legacy(text) => Addon { text, display: true },
            AddonRepr::Full { text, display } => Addon { text, display },
        }
    }
}

// =============================================================================
// Select Options
// =============================================================================

/// Ordered `optionKey -> optionLabel` mapping of a select entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct SelectOptions(Vec<(String, String)>);

impl SelectOptions {
    pub fn new(options: Vec<(String, String)>) -> Self {
        Self(options)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, l)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined keys, as shown in error messages.
    pub fn joined_keys(&self) -> String {
        self.keys().collect::<Vec<_>>().join(",")
    }
}

impl TryFrom<Map<String, Value>> for SelectOptions {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        map.into_iter()
            .map(|(key, label)| match label {
                Value::String(s) => Ok((key, s)),
                _ => Err(format!("option `{}`'s value should be a string", key)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SelectOptions)
    }
}

impl From<SelectOptions> for Map<String, Value> {
    fn from(options: SelectOptions) -> Self {
        options
            .0
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }
}

// =============================================================================
// Per-type attributes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_before: Option<Addon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon_after: Option<Addon>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectField {
    pub options: SelectOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListField {
    pub list_size: usize,
    pub item_type: ListItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

/// Type-specific part of a definition, tagged by `"type"` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Number(NumberField),
    Text(TextField),
    Switch(SwitchField),
    Select(SelectField),
    List(ListField),
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::Number(_) => FieldType::Number,
            FieldKind::Text(_) => FieldType::Text,
            FieldKind::Switch(_) => FieldType::Switch,
            FieldKind::Select(_) => FieldType::Select,
            FieldKind::List(_) => FieldType::List,
        }
    }
}

// =============================================================================
// Form Entry Definition
// =============================================================================

/// One schema field (a "FED").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEntryDefinition {
    /// Output property name, unique within a schema.
    pub key: String,
    /// Human-readable name, used in CSV headers and error messages.
    pub label: String,
    /// Defaults to `true` unless explicitly `false`.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FormEntryDefinition {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            required: true,
            tooltip: None,
            kind,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// The definition's `defaultValue` as JSON, if any.
    pub fn default_value(&self) -> Option<Value> {
        match &self.kind {
            FieldKind::Number(f) => f.default_value.and_then(number_value),
            FieldKind::Text(f) => f.default_value.clone().map(Value::String),
            FieldKind::Switch(f) => f.default_value.map(Value::Bool),
            FieldKind::Select(f) => f.default_value.clone().map(Value::String),
            FieldKind::List(f) => f.default_value.clone().map(Value::Array),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Convert an `f64` to JSON, keeping integral values as integers.
///
/// Returns `None` for NaN and infinities, which JSON cannot carry.
pub fn number_value(n: f64) -> Option<Value> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

// =============================================================================
// Form Schema
// =============================================================================

/// Ordered list of definitions with pairwise distinct keys.
///
/// Order is significant: it defines the CSV column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<FormEntryDefinition>", into = "Vec<FormEntryDefinition>")]
pub struct FormSchema(Vec<FormEntryDefinition>);

impl FormSchema {
    /// Build a schema, rejecting the first duplicated key.
    pub fn new(entries: Vec<FormEntryDefinition>) -> Result<Self, String> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.key == entry.key) {
                return Err(format!("`{}` is a duplicate key", entry.key));
            }
        }
        Ok(Self(entries))
    }

    pub fn entries(&self) -> &[FormEntryDefinition] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FormEntryDefinition> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&FormEntryDefinition> {
        self.0.iter().find(|e| e.key == key)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.key.as_str()).collect()
    }
}

impl TryFrom<Vec<FormEntryDefinition>> for FormSchema {
    type Error = String;

    fn try_from(entries: Vec<FormEntryDefinition>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<FormSchema> for Vec<FormEntryDefinition> {
    fn from(schema: FormSchema) -> Self {
        schema.0
    }
}

impl<'a> IntoIterator for &'a FormSchema {
    type Item = &'a FormEntryDefinition;
    type IntoIter = std::slice::Iter<'a, FormEntryDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Records
// =============================================================================

/// One object within a scene, numbered from 1.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(rename = "objNum")]
    pub obj_num: usize,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One scene: scene-schema fields plus its objects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
}

impl SceneRecord {
    /// Display name used by scene lists: the name field, else `Scene {n}`.
    pub fn display_name(&self, name_key: &str, n: usize) -> String {
        match self.fields.get(name_key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Null) | None => format!("Scene {}", n),
            Some(Value::String(_)) => format!("Scene {}", n),
            Some(other) => other.to_string(),
        }
    }
}

/// One scheduled presentation of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialEntry {
    pub trial_num: usize,
    pub trial_name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
}

/// The trial file document: `{ "trials": [...] }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialFile {
    pub trials: Vec<TrialEntry>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_deserializes_by_type_tag() {
        let fed: FormEntryDefinition = serde_json::from_value(json!({
            "key": "coordinates",
            "label": "Coordinates (X, Y, Z)",
            "type": "list",
            "listSize": 3,
            "itemType": "number",
            "defaultValue": [1, 2, 3]
        }))
        .unwrap();

        assert!(fed.required);
        match fed.kind {
            FieldKind::List(list) => {
                assert_eq!(list.list_size, 3);
                assert_eq!(list.item_type, ListItemType::Number);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_addon_string() {
        let fed: FormEntryDefinition = serde_json::from_value(json!({
            "key": "soundFile",
            "label": "Sound file",
            "type": "text",
            "addonAfter": ".json"
        }))
        .unwrap();

        match fed.kind {
            FieldKind::Text(text) => assert_eq!(text.addon_after, Some(Addon::new(".json"))),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_select_options_keep_order() {
        let fed: FormEntryDefinition = serde_json::from_value(json!({
            "key": "feedbackColor",
            "label": "Feedback Color",
            "type": "select",
            "options": { "gray": "Gray", "black": "Black", "blue": "Blue" }
        }))
        .unwrap();

        match fed.kind {
            FieldKind::Select(select) => {
                assert_eq!(select.options.joined_keys(), "gray,black,blue");
                assert_eq!(select.options.label("blue"), Some("Blue"));
            }
            other => panic!("expected select, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<FormEntryDefinition>(json!({
            "key": "x",
            "label": "X",
            "type": "slider"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_rejects_duplicate_keys() {
        let result = serde_json::from_value::<FormSchema>(json!([
            { "key": "x", "label": "A", "type": "switch" },
            { "key": "x", "label": "B", "type": "switch" }
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_object_record_serializes_obj_num_first() {
        let mut fields = Map::new();
        fields.insert("objType".into(), json!("car"));
        let object = ObjectRecord { obj_num: 1, fields };

        let json = serde_json::to_string(&object).unwrap();
        assert_eq!(json, r#"{"objNum":1,"objType":"car"}"#);
    }

    #[test]
    fn test_scene_record_roundtrips_objects_field() {
        let scene: SceneRecord = serde_json::from_value(json!({
            "sceneName": "room1",
            "objects": [{ "objNum": 1, "objType": "car" }]
        }))
        .unwrap();

        assert_eq!(scene.fields.len(), 1);
        assert_eq!(scene.objects.len(), 1);
        assert_eq!(scene.objects[0].fields["objType"], "car");
    }

    #[test]
    fn test_number_value_prefers_integers() {
        assert_eq!(number_value(3.0), Some(json!(3)));
        assert_eq!(number_value(0.5), Some(json!(0.5)));
        assert_eq!(number_value(f64::NAN), None);
    }
}
