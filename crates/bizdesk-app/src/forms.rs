// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Normalization of backend field metadata into ordered [`FormDef`] lists.

use serde_json::{Map, Value};

use crate::FormDef;

/// Where the field data lives inside a raw metadata value.
///
/// Resolution order: `children`, then `child.children`, then the value itself.
#[derive(Debug, Clone, Copy)]
enum MetaShape<'a> {
    Descriptors(&'a [Value]),
    FieldMap(&'a Map<String, Value>),
    Empty,
}

impl<'a> MetaShape<'a> {
    fn resolve(meta: &'a Value) -> Self {
        if let Value::Array(items) = meta {
            return Self::Descriptors(items);
        }

        let target = meta
            .get("children")
            .filter(|value| !value.is_null())
            .or_else(|| {
                meta.get("child")
                    .and_then(|child| child.get("children"))
                    .filter(|value| !value.is_null())
            })
            .unwrap_or(meta);

        match target {
            Value::Array(items) => Self::Descriptors(items),
            Value::Object(map) => Self::FieldMap(map),
            _ => Self::Empty,
        }
    }
}

/// Converts raw header metadata into a flat list of descriptors.
///
/// An already-normalized list passes through unchanged, except that items
/// without a `field` key cannot be descriptors and are dropped with a
/// warning. Nested descriptors
/// keep their raw `children` and are normalized on demand with
/// [`get_children_form_defs`].
pub fn convert_to_form_defs(meta: &Value) -> Vec<FormDef> {
    match MetaShape::resolve(meta) {
        MetaShape::Descriptors(items) => items
            .iter()
            .filter_map(|item| match serde_json::from_value::<FormDef>(item.clone()) {
                Ok(def) => Some(def),
                Err(error) => {
                    tracing::warn!("skipping malformed field descriptor: {error}");
                    None
                }
            })
            .collect(),
        MetaShape::FieldMap(map) => map
            .iter()
            .filter_map(|(field, descriptor)| descriptor_to_form_def(field, descriptor))
            .collect(),
        MetaShape::Empty => Vec::new(),
    }
}

fn descriptor_to_form_def(field: &str, descriptor: &Value) -> Option<FormDef> {
    let mut props = match descriptor {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    props.insert("field".to_owned(), Value::String(field.to_owned()));

    match serde_json::from_value::<FormDef>(Value::Object(props)) {
        Ok(def) => Some(def),
        Err(error) => {
            tracing::debug!("skipping field {field:?} with malformed descriptor: {error}");
            None
        }
    }
}

/// Stable ordering: fields named in `order` first, in that order; the rest
/// keep their relative position after them.
pub fn sort_form_defs<S: AsRef<str>>(defs: Vec<FormDef>, order: &[S]) -> Vec<FormDef> {
    if order.is_empty() {
        return defs;
    }

    let rank = |field: &str| {
        order
            .iter()
            .position(|name| name.as_ref() == field)
            .unwrap_or(usize::MAX)
    };

    let mut ranked: Vec<(usize, FormDef)> = defs
        .into_iter()
        .map(|def| (rank(&def.field), def))
        .collect();
    ranked.sort_by_key(|(position, _)| *position);
    ranked.into_iter().map(|(_, def)| def).collect()
}

pub fn pick_form_def<'a>(defs: &'a [FormDef], field: &str) -> Option<&'a FormDef> {
    defs.iter().find(|def| def.field == field)
}

pub fn filter_form_defs<S: AsRef<str>>(defs: &[FormDef], exclude: &[S]) -> Vec<FormDef> {
    defs.iter()
        .filter(|def| !exclude.iter().any(|name| name.as_ref() == def.field))
        .cloned()
        .collect()
}

/// Normalized descriptors nested under a composite field, or empty.
pub fn get_children_form_defs(def: &FormDef) -> Vec<FormDef> {
    def.nested_meta()
        .map(convert_to_form_defs)
        .unwrap_or_default()
}

/// Removes the named top-level fields from a raw header metadata map.
pub fn filter_header_meta<S: AsRef<str>>(meta: Value, exclude: &[S]) -> Value {
    match meta {
        Value::Object(mut map) if !exclude.is_empty() => {
            for name in exclude {
                map.shift_remove(name.as_ref());
            }
            Value::Object(map)
        }
        other => other,
    }
}
