// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use std::collections::HashMap;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::{FieldType, FormDef, normalize_bool, value_text};

pub const EMPTY_PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolLabels {
    pub yes: String,
    pub no: String,
}

impl Default for BoolLabels {
    fn default() -> Self {
        Self {
            yes: "Yes".to_owned(),
            no: "No".to_owned(),
        }
    }
}

/// Label and value lookups prebuilt from one normalized field list.
#[derive(Debug, Clone, Default)]
pub struct FieldHelpers {
    labels: HashMap<String, String>,
    choices: HashMap<String, HashMap<String, String>>,
    bool_labels: BoolLabels,
}

impl FieldHelpers {
    pub fn new(defs: &[FormDef]) -> Self {
        let mut labels = HashMap::with_capacity(defs.len());
        let mut choices = HashMap::new();
        for def in defs {
            labels.insert(def.field.clone(), def.label.clone());
            if def.has_choices() {
                choices.insert(def.field.clone(), choice_table(def));
            }
        }

        Self {
            labels,
            choices,
            bool_labels: BoolLabels::default(),
        }
    }

    pub fn with_bool_labels(mut self, bool_labels: BoolLabels) -> Self {
        self.bool_labels = bool_labels;
        self
    }

    /// Descriptor label, or the field name itself when unknown or unlabeled.
    pub fn field_label(&self, field: &str) -> String {
        match self.labels.get(field) {
            Some(label) if !label.is_empty() => label.clone(),
            _ => field.to_owned(),
        }
    }

    /// Choice label for `value`, or the raw value when it is not a known choice.
    pub fn choice_label(&self, field: &str, value: &Value) -> String {
        let raw = value_text(value);
        self.choices
            .get(field)
            .and_then(|table| table.get(&raw))
            .cloned()
            .unwrap_or(raw)
    }

    pub fn render_field_value(&self, def: &FormDef, value: Option<&Value>) -> String {
        let Some(value) = value.filter(|value| !is_blank(value)) else {
            return EMPTY_PLACEHOLDER.to_owned();
        };

        match &def.field_type {
            FieldType::DateTime => format_timestamp(value, TimestampPrecision::DateTime),
            FieldType::Date => format_timestamp(value, TimestampPrecision::Date),
            _ if def.has_choices() => {
                if self.choices.contains_key(&def.field) {
                    self.choice_label(&def.field, value)
                } else {
                    let raw = value_text(value);
                    choice_table(def).remove(&raw).unwrap_or(raw)
                }
            }
            FieldType::Boolean => {
                if normalize_bool(value) {
                    self.bool_labels.yes.clone()
                } else {
                    self.bool_labels.no.clone()
                }
            }
            FieldType::Integer | FieldType::Float | FieldType::Decimal => value_text(value),
            FieldType::String
            | FieldType::Time
            | FieldType::Email
            | FieldType::Url
            | FieldType::Choice
            | FieldType::MultipleChoice
            | FieldType::FileUpload
            | FieldType::ImageUpload
            | FieldType::Related
            | FieldType::NestedObject
            | FieldType::List
            | FieldType::Other(_) => value_text(value),
        }
    }

    /// Renders `row[field]` using the descriptor for `field`, if any.
    pub fn render_row_cell(&self, def: &FormDef, row: &Value) -> String {
        self.render_field_value(def, row.get(&def.field))
    }
}

fn choice_table(def: &FormDef) -> HashMap<String, String> {
    def.choices
        .iter()
        .map(|choice| (choice.key(), choice.display()))
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(raw) => raw.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampPrecision {
    Date,
    DateTime,
}

fn format_timestamp(value: &Value, precision: TimestampPrecision) -> String {
    let Some(parsed) = parse_timestamp(value) else {
        return value_text(value);
    };

    let formatted = match precision {
        TimestampPrecision::Date => parsed
            .date()
            .format(&format_description!("[year]-[month]-[day]")),
        TimestampPrecision::DateTime => parsed.format(&format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        )),
    };
    formatted.unwrap_or_else(|_| value_text(value))
}

/// Accepts RFC 3339 timestamps, naive `T`/space separated datetimes, bare
/// dates and epoch milliseconds. Offsets are kept as sent.
fn parse_timestamp(value: &Value) -> Option<PrimitiveDateTime> {
    match value {
        Value::Number(number) => {
            let millis = number.as_i64()?;
            let at =
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()?;
            Some(PrimitiveDateTime::new(at.date(), at.time()))
        }
        Value::String(raw) => parse_timestamp_text(raw.trim()),
        _ => None,
    }
}

fn parse_timestamp_text(raw: &str) -> Option<PrimitiveDateTime> {
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(PrimitiveDateTime::new(at.date(), at.time()));
    }

    let naive_formats: [&[BorrowedFormatItem<'static>]; 6] = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];
    if let Some(parsed) = naive_formats
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(raw, *format).ok())
    {
        return Some(parsed);
    }

    Date::parse(raw, &format_description!("[year]-[month]-[day]"))
        .ok()
        .map(Date::midnight)
}
