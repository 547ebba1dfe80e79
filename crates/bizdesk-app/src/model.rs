// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Semantic type tag carried by a field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    Email,
    Url,
    Choice,
    MultipleChoice,
    FileUpload,
    ImageUpload,
    Related,
    NestedObject,
    List,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Email => "email",
            Self::Url => "url",
            Self::Choice => "choice",
            Self::MultipleChoice => "multiple choice",
            Self::FileUpload => "file upload",
            Self::ImageUpload => "image upload",
            Self::Related => "field",
            Self::NestedObject => "nested object",
            Self::List => "list",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "slug" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "time" => Self::Time,
            "email" => Self::Email,
            "url" => Self::Url,
            "choice" => Self::Choice,
            "multiple choice" => Self::MultipleChoice,
            "file upload" => Self::FileUpload,
            "image upload" => Self::ImageUpload,
            "field" => Self::Related,
            "nested object" => Self::NestedObject,
            "list" => Self::List,
            _ => Self::Other(value.to_owned()),
        }
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }

    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::NestedObject | Self::List)
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::default()),
            raw => Ok(Self::parse(&value_text(&raw))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: Value,
    #[serde(alias = "display_name", default)]
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Lookup key used to match a raw cell value against this choice.
    pub fn key(&self) -> String {
        value_text(&self.value)
    }

    pub fn display(&self) -> String {
        if self.label.is_empty() {
            self.key()
        } else {
            self.label.clone()
        }
    }
}

/// Normalized description of one entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDef {
    pub field: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub required: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "lenient_choices")]
    pub choices: Vec<Choice>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormDef {
    pub fn new(field: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            field_type,
            required: false,
            read_only: false,
            choices: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    /// Raw nested field map, from `children` or `child.children`.
    pub fn nested_meta(&self) -> Option<&Value> {
        if let Some(children) = self.extra.get("children").filter(|value| !value.is_null()) {
            return Some(children);
        }
        self.extra
            .get("child")
            .and_then(|child| child.get("children"))
            .filter(|value| !value.is_null())
    }
}

/// Coerces the loose truthy/falsy encodings servers send into a strict bool.
/// Unrecognized values are `false`.
pub fn normalize_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Plain string form of a JSON value: strings unquoted, null empty.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(raw) => raw.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(normalize_bool(&raw))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(value_text(&raw))
}

fn lenient_choices<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Choice>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let Value::Array(items) = raw else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => serde_json::from_value::<Choice>(item).ok(),
            Value::Null => None,
            scalar => Some(Choice {
                label: value_text(&scalar),
                value: scalar,
            }),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{FieldType, FormDef, normalize_bool, value_text};
    use serde_json::json;

    #[test]
    fn truthy_encodings_normalize_to_true() {
        for raw in [json!("true"), json!(true), json!(1), json!("1"), json!(" TRUE ")] {
            assert!(normalize_bool(&raw), "{raw} should be truthy");
        }
    }

    #[test]
    fn falsy_and_unknown_encodings_normalize_to_false() {
        for raw in [
            json!("false"),
            json!(false),
            json!(0),
            json!(null),
            json!("maybe"),
            json!([1]),
        ] {
            assert!(!normalize_bool(&raw), "{raw} should be falsy");
        }
    }

    #[test]
    fn field_type_parse_is_case_insensitive_and_keeps_unknown_tags() {
        assert_eq!(FieldType::parse("DateTime"), FieldType::DateTime);
        assert_eq!(FieldType::parse("file upload"), FieldType::FileUpload);
        assert_eq!(
            FieldType::parse("geo point"),
            FieldType::Other("geo point".to_owned())
        );
        assert_eq!(FieldType::Other("geo point".to_owned()).as_str(), "geo point");
    }

    #[test]
    fn form_def_decodes_loose_descriptor() {
        let def: FormDef = serde_json::from_value(json!({
            "field": "status",
            "label": "Status",
            "type": "choice",
            "required": "true",
            "read_only": 0,
            "choices": [
                {"value": "open", "display_name": "Open"},
                {"value": 2, "label": "Two"},
                "raw"
            ],
            "help_text": "current status"
        }))
        .expect("descriptor decodes");

        assert_eq!(def.field_type, FieldType::Choice);
        assert!(def.required);
        assert!(!def.read_only);
        assert_eq!(def.choices.len(), 3);
        assert_eq!(def.choices[0].label, "Open");
        assert_eq!(def.choices[1].key(), "2");
        assert_eq!(def.choices[2].display(), "raw");
        assert_eq!(def.extra.get("help_text"), Some(&json!("current status")));
    }

    #[test]
    fn nested_meta_prefers_children_over_child_children() {
        let mut def = FormDef::new("items", "Items", FieldType::List);
        def.extra
            .insert("child".to_owned(), json!({"children": {"sku": {}}}));
        assert_eq!(def.nested_meta(), Some(&json!({"sku": {}})));

        def.extra
            .insert("children".to_owned(), json!({"qty": {}}));
        assert_eq!(def.nested_meta(), Some(&json!({"qty": {}})));
    }

    #[test]
    fn value_text_unquotes_strings() {
        assert_eq!(value_text(&json!("abc")), "abc");
        assert_eq!(value_text(&json!(12.5)), "12.5");
        assert_eq!(value_text(&json!(null)), "");
    }
}
