// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;

pub const IDENTITY_FIELDS: [&str; 2] = ["id", "pk"];
pub const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// Copy of `row` suitable for pre-filling a create form.
///
/// Top-level identity and timestamp fields and every name in `exclude` are
/// dropped; nested objects lose `id`/`pk` at any depth.
pub fn default_copy_data<S: AsRef<str>>(row: &Value, exclude: &[S]) -> Value {
    let Value::Object(source) = row else {
        return row.clone();
    };

    let mut copy = source.clone();
    for key in IDENTITY_FIELDS.iter().chain(TIMESTAMP_FIELDS.iter()) {
        copy.shift_remove(*key);
    }
    for key in exclude {
        copy.shift_remove(key.as_ref());
    }
    for value in copy.values_mut() {
        strip_nested_identity(value);
    }
    Value::Object(copy)
}

fn strip_nested_identity(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in IDENTITY_FIELDS {
                map.shift_remove(key);
            }
            for nested in map.values_mut() {
                strip_nested_identity(nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nested_identity),
        _ => {}
    }
}

/// The entity inside a create/update response, which may be wrapped as `{data: ...}`.
pub fn unwrap_envelope(response: &Value) -> &Value {
    match response.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::{default_copy_data, unwrap_envelope};
    use serde_json::json;

    #[test]
    fn copy_strips_identity_and_timestamps() {
        let row = json!({
            "id": 5,
            "pk": 5,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "account_name": "Acme",
            "address": {"id": 11, "city": "Oslo", "geo": {"pk": 3, "lat": 1.5}},
            "contacts": [{"id": 1, "name": "Ann"}, {"pk": 2, "name": "Bo"}]
        });

        let copy = default_copy_data(&row, &[] as &[&str]);
        assert_eq!(
            copy,
            json!({
                "account_name": "Acme",
                "address": {"city": "Oslo", "geo": {"lat": 1.5}},
                "contacts": [{"name": "Ann"}, {"name": "Bo"}]
            })
        );
    }

    #[test]
    fn copy_drops_caller_exclusions() {
        let row = json!({"id": 1, "name": "Order 1", "payments": [{"id": 9}], "production_orders": []});
        let copy = default_copy_data(&row, &["payments", "production_orders"]);
        assert_eq!(copy, json!({"name": "Order 1"}));
    }

    #[test]
    fn nested_timestamps_are_kept() {
        let row = json!({"id": 1, "shipment": {"id": 2, "created_at": "2024-01-01"}});
        let copy = default_copy_data(&row, &[] as &[&str]);
        assert_eq!(copy, json!({"shipment": {"created_at": "2024-01-01"}}));
    }

    #[test]
    fn envelope_is_unwrapped_only_for_object_data() {
        let wrapped = json!({"data": {"id": 9}});
        assert_eq!(unwrap_envelope(&wrapped), &json!({"id": 9}));

        let bare = json!({"id": 9, "data": "note text"});
        assert_eq!(unwrap_envelope(&bare), &bare);
    }
}
