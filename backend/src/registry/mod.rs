//! Field type registry.
//!
//! Single source of truth for the per-type rules of a [`FormEntryDefinition`]:
//!
//! - [`validate_definition_shape`] - Which attributes a raw definition must/may carry
//! - [`coerce_cell`] - How a raw CSV cell is turned into a typed value
//! - [`check_value`] - How a committed form value is checked against constraints
//!
//! Each operation dispatches once over [`FieldType`] / [`FieldKind`], so adding a
//! type is a single, compiler-checked change. Nothing here panics on bad data;
//! every failure is a message in the returned list.

use serde_json::{Map, Value};

use crate::models::{
    number_value, FieldKind, FieldType, FormEntryDefinition, ListField, ListItemType,
    NumberField, MAX_LIST_SIZE,
};

/// Message for a missing or unrecognized `type`.
pub const TYPE_MESSAGE: &str =
    "Must contain `type`, which should be one of number, text, switch, select, list.";

// =============================================================================
// Definition shape
// =============================================================================

/// Check the type-specific attributes of a raw definition object.
///
/// Common attributes (`key`, `label`, `tooltip`) are checked by the schema
/// validator; this function only looks at `type` and what it implies.
pub fn validate_definition_shape(entry: &Map<String, Value>) -> Vec<String> {
    let mut messages = Vec::new();

    let field_type = entry
        .get("type")
        .and_then(Value::as_str)
        .and_then(FieldType::from_tag);

    match field_type {
        Some(FieldType::Number) => shape_number(entry, &mut messages),
        Some(FieldType::Text) => shape_text(entry, &mut messages),
        Some(FieldType::Switch) => shape_switch(entry, &mut messages),
        Some(FieldType::Select) => shape_select(entry, &mut messages),
        Some(FieldType::List) => shape_list(entry, &mut messages),
        None => messages.push(TYPE_MESSAGE.to_string()),
    }

    messages
}

fn shape_number(entry: &Map<String, Value>, messages: &mut Vec<String>) {
    if entry.get("defaultValue").is_some_and(|v| !v.is_number()) {
        messages.push("`defaultValue` of a number entry should be a number".to_string());
    }

    for attr in ["min", "max", "step"] {
        if entry.get(attr).is_some_and(|v| !v.is_number()) {
            messages.push(format!("`{}` of a number entry should be a number", attr));
        }
    }

    let min = entry.get("min").and_then(Value::as_f64);
    let max = entry.get("max").and_then(Value::as_f64);
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            messages.push(format!("`min` ({}) should not be greater than `max` ({})", min, max));
        }
    }
}

fn shape_text(entry: &Map<String, Value>, messages: &mut Vec<String>) {
    if entry.get("defaultValue").is_some_and(|v| !v.is_string()) {
        messages.push("`defaultValue` of a text entry should be a string".to_string());
    }

    for attr in ["addonBefore", "addonAfter"] {
        if let Some(addon) = entry.get(attr) {
            if !is_addon_shape(addon) {
                messages.push(format!(
                    "`{}` should be a string or an object of the form `{{ text, display }}`",
                    attr
                ));
            }
        }
    }
}

fn is_addon_shape(addon: &Value) -> bool {
    match addon {
        Value::String(_) => true,
        Value::Object(obj) => {
            obj.get("text").is_some_and(Value::is_string)
                && obj.get("display").map_or(true, Value::is_boolean)
        }
        _ => false,
    }
}

fn shape_switch(entry: &Map<String, Value>, messages: &mut Vec<String>) {
    if entry.get("defaultValue").is_some_and(|v| !v.is_boolean()) {
        messages.push("`defaultValue` of a switch entry should be `true` or `false`".to_string());
    }
}

fn shape_select(entry: &Map<String, Value>, messages: &mut Vec<String>) {
    let options = match entry.get("options").and_then(Value::as_object) {
        Some(options) => options,
        None => {
            messages.push(
                "`options` must be an object of the form `{ optionKey: optionLabel }`".to_string(),
            );
            return;
        }
    };

    if options.is_empty() {
        messages.push("Must contain at least one option in `options`".to_string());
        return;
    }

    for (key, label) in options {
        if !label.is_string() {
            messages.push(format!("Option `{}`'s value should be a string", key));
        }
    }

    if let Some(default) = entry.get("defaultValue") {
        let known = default.as_str().is_some_and(|d| options.contains_key(d));
        if !known {
            let keys: Vec<&str> = options.keys().map(String::as_str).collect();
            messages.push(format!("`defaultValue` should be one of {}", keys.join(",")));
        }
    }
}

fn shape_list(entry: &Map<String, Value>, messages: &mut Vec<String>) {
    let list_size = entry
        .get("listSize")
        .and_then(Value::as_u64)
        .filter(|n| (1..=MAX_LIST_SIZE as u64).contains(n));

    let list_size = match list_size {
        Some(n) => n as usize,
        None => {
            messages.push(format!(
                "List entry must contain `listSize`, which should be an integer <= {}",
                MAX_LIST_SIZE
            ));
            return;
        }
    };

    let default = entry.get("defaultValue");
    if let Some(default) = default {
        let sized = default.as_array().is_some_and(|a| a.len() == list_size);
        if !sized {
            messages.push(format!("`defaultValue` should be a list of length {}.", list_size));
        }
    }

    let item_type = entry
        .get("itemType")
        .and_then(Value::as_str)
        .and_then(ListItemType::from_tag);

    match item_type {
        Some(item_type) => {
            if let Some(items) = default.and_then(Value::as_array) {
                if !items.iter().all(|v| item_type.matches(v)) {
                    messages.push(format!(
                        "`defaultValue` should only contain {}",
                        item_type.scalar_name()
                    ));
                }
            }
        }
        None => messages.push(
            "List entry must contain `itemType`, which should be `number`, `text` or `switch`"
                .to_string(),
        ),
    }

    if entry.get("step").is_some_and(|v| !v.is_number()) {
        messages.push("`step` of a list entry should be a number".to_string());
    }
    if entry.get("precision").is_some_and(|v| v.as_u64().is_none()) {
        messages.push("`precision` of a list entry should be a non-negative integer".to_string());
    }
}

// =============================================================================
// Cell coercion
// =============================================================================

/// Outcome of coercing one raw cell.
///
/// A value may be present even when `errors` is not empty (an out-of-range
/// number, a text cell missing its suffix); callers must treat any error as
/// blocking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Coerced {
    pub value: Option<Value>,
    pub errors: Vec<String>,
}

impl Coerced {
    fn ok(value: Value) -> Self {
        Self { value: Some(value), errors: Vec::new() }
    }

    fn fail(message: String) -> Self {
        Self { value: None, errors: vec![message] }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Coerce a raw CSV cell according to its definition.
///
/// `raw` is `None` when the row is shorter than the header.
pub fn coerce_cell(fed: &FormEntryDefinition, raw: Option<&str>) -> Coerced {
    let raw = match raw {
        Some(raw) => raw,
        None => return Coerced::fail("entry is undefined.".to_string()),
    };

    if raw.is_empty() {
        if fed.required {
            return Coerced::fail(format!(
                "entry \"{}\" is a required field but input is empty.",
                fed.label
            ));
        }
        return Coerced::default();
    }

    let label = &fed.label;
    match &fed.kind {
        FieldKind::Text(text) => {
            let mut coerced = Coerced::ok(Value::String(raw.to_string()));
            if let Some(addon) = &text.addon_after {
                if !raw.contains(addon.text.as_str()) {
                    coerced.errors.push(format!(
                        "entry \"{}\" ({}) should have suffix \"{}\".",
                        raw, label, addon.text
                    ));
                }
            }
            coerced
        }

        FieldKind::Number(number) => match parse_number(raw) {
            Some(n) => {
                let mut coerced = Coerced { value: number_value(n), errors: Vec::new() };
                if !in_range(number, n) {
                    coerced.errors.push(format!(
                        "entry \"{}\" ({}) should be in range {}.",
                        raw,
                        label,
                        range_text(number)
                    ));
                }
                coerced
            }
            None => Coerced::fail(format!("entry \"{}\" ({}) should be a number.", raw, label)),
        },

        FieldKind::Switch(_) => match parse_switch(raw) {
            Some(b) => Coerced::ok(Value::Bool(b)),
            None => Coerced::fail(format!(
                "entry \"{}\" ({}) should be \"T\" or \"F\".",
                raw, label
            )),
        },

        FieldKind::Select(select) => {
            if select.options.contains_key(raw) {
                Coerced::ok(Value::String(raw.to_string()))
            } else {
                Coerced::fail(format!(
                    "entry \"{}\" ({}) should be one of {}.",
                    raw,
                    label,
                    select.options.joined_keys()
                ))
            }
        }

        FieldKind::List(list) => coerce_list(list, raw, label),
    }
}

fn coerce_list(list: &ListField, raw: &str, label: &str) -> Coerced {
    let inner = match raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => {
            return Coerced::fail(format!(
                "entry \"{}\" ({}) should be in quotation marks.",
                raw, label
            ))
        }
    };

    let pieces: Vec<&str> = inner.split(',').map(str::trim).collect();
    if pieces.len() != list.list_size || pieces.iter().any(|p| p.is_empty()) {
        return Coerced::fail(format!(
            "entry \"{}\" ({}) should be a list of size {}, separated by commas.",
            raw, label, list.list_size
        ));
    }

    match list.item_type {
        ListItemType::Text => Coerced::ok(Value::Array(
            pieces.into_iter().map(|p| Value::String(p.to_string())).collect(),
        )),
        ListItemType::Number => pieces
            .into_iter()
            .map(|p| parse_number(p).and_then(number_value))
            .collect::<Option<Vec<_>>>()
            .map(|items| Coerced::ok(Value::Array(items)))
            .unwrap_or_else(|| {
                Coerced::fail(format!(
                    "entry \"{}\" ({}) should be a list of numbers.",
                    raw, label
                ))
            }),
        ListItemType::Switch => pieces
            .into_iter()
            .map(|p| parse_switch(p).map(Value::Bool))
            .collect::<Option<Vec<_>>>()
            .map(|items| Coerced::ok(Value::Array(items)))
            .unwrap_or_else(|| {
                Coerced::fail(format!(
                    "entry \"{}\" ({}) should be a list of \"T\" or \"F\" values.",
                    raw, label
                ))
            }),
    }
}

/// Parse a number the way spreadsheet users write them.
///
/// Surrounding whitespace is ignored; NaN and infinities are rejected.
/// Unsigned `0x`, `0b` and `0o` literals are read in their radix.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let radix = match raw.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0b" | "0B") => Some(2),
        Some("0o" | "0O") => Some(8),
        _ => None,
    };

    match radix {
        Some(radix) => {
            let digits = &raw[2..];
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return None;
            }
            u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
        }
        None => raw.parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw {
        "T" => Some(true),
        "F" => Some(false),
        _ => None,
    }
}

fn in_range(number: &NumberField, n: f64) -> bool {
    number.min.map_or(true, |min| n >= min) && number.max.map_or(true, |max| n <= max)
}

fn range_text(number: &NumberField) -> String {
    let min = number.min.map_or("-Infinity".to_string(), |m| m.to_string());
    let max = number.max.map_or("Infinity".to_string(), |m| m.to_string());
    format!("[{}, {}]", min, max)
}

// =============================================================================
// Committed value checks
// =============================================================================

/// Check a committed (already typed) value against its definition.
///
/// Used by the manual form path, where values arrive as JSON rather than text.
pub fn check_value(fed: &FormEntryDefinition, value: Option<&Value>) -> Vec<String> {
    let label = &fed.label;
    let value = match value {
        None | Some(Value::Null) => return required_message(fed),
        Some(Value::String(s)) if s.is_empty() && fed.field_type() != FieldType::List => {
            return required_message(fed)
        }
        Some(value) => value,
    };

    let mut messages = Vec::new();
    match &fed.kind {
        FieldKind::Number(number) => match value.as_f64() {
            Some(n) if !in_range(number, n) => messages.push(format!(
                "\"{}\" ({}) should be in range {}.",
                shown(value),
                label,
                range_text(number)
            )),
            Some(_) => {}
            None => messages.push(format!("\"{}\" ({}) should be a number.", shown(value), label)),
        },

        FieldKind::Text(_) => {
            if !value.is_string() {
                messages.push(format!("\"{}\" ({}) should be text.", shown(value), label));
            }
        }

        FieldKind::Switch(_) => {
            if !value.is_boolean() {
                messages.push(format!("\"{}\" ({}) should be true or false.", shown(value), label));
            }
        }

        FieldKind::Select(select) => {
            let known = value.as_str().is_some_and(|v| select.options.contains_key(v));
            if !known {
                messages.push(format!(
                    "\"{}\" ({}) should be one of {}.",
                    shown(value),
                    label,
                    select.options.joined_keys()
                ));
            }
        }

        FieldKind::List(list) => {
            let complete = value.as_array().is_some_and(|items| {
                items.len() == list.list_size && items.iter().all(|v| list.item_type.matches(v))
            });
            if !complete {
                messages.push(format!(
                    "{} ({}) should be a list of {} {} values; all entries must be filled.",
                    value,
                    label,
                    list.list_size,
                    list.item_type.scalar_name()
                ));
            }
        }
    }
    messages
}

fn shown(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required_message(fed: &FormEntryDefinition) -> Vec<String> {
    if fed.required {
        vec![format!("\"{}\" is a required field but input is empty.", fed.label)]
    } else {
        Vec::new()
    }
}
