// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flattening of name/value lists.
//!
//! Producers frequently emit attributes as a list of objects, each carrying a name and a
//! value:
//!
//! ```text
//! {"Attrs": [{"Name": "a", "Value": 1}, {"Name": "b", "Value": 2}]}
//! ```
//!
//! Graylog indexes that poorly, so [`normalize`] rewrites it into a plain mapping:
//!
//! ```text
//! {"Attrs": {"a": 1, "b": 2}}
//! ```
//!
//! Keys are matched case-insensitively. An element with fields beyond the name and the
//! value keeps every non-name field as a one-entry object, in field order. Elements
//! without a usable name are left out of the flattened mapping, and a list is only
//! replaced when at least one of its elements flattened.

use serde_json::{Map, Value};

use crate::Record;

/// Flattens every top-level list of name/value objects in `record`.
///
/// Values that are not lists, and lists where no element carries a usable name, are
/// returned untouched. Never fails: malformed elements are skipped.
///
/// # Examples
///
/// ```
/// use graylog_shipper::normalizer::normalize;
/// use serde_json::json;
///
/// let record = json!({"Attrs": [{"Name": "a", "Value": 1}, {"Name": "b", "Value": 2}]});
/// let serde_json::Value::Object(record) = record else { unreachable!() };
///
/// let normalized = normalize(record);
/// assert_eq!(serde_json::Value::Object(normalized), json!({"Attrs": {"a": 1, "b": 2}}));
/// ```
#[must_use]
pub fn normalize(mut record: Record) -> Record {
    for value in record.values_mut() {
        let Value::Array(elements) = value else {
            continue;
        };

        let flattened = flatten_elements(elements);
        if !flattened.is_empty() {
            *value = Value::Object(flattened);
        }
    }
    record
}

fn flatten_elements(elements: &[Value]) -> Map<String, Value> {
    let mut flattened = Map::new();

    for element in elements {
        let Value::Object(fields) = element else {
            continue;
        };

        let mut name = None;
        let mut values = Vec::with_capacity(fields.len());
        for (key, field) in fields {
            match key.to_lowercase().as_str() {
                "name" => name = Some(field),
                // A bare name/value pair contributes the raw value.
                "value" if fields.len() == 2 => values.push(field.clone()),
                _ => values.push(single_entry(key, field)),
            }
        }

        let Some(key) = name.and_then(flattened_key) else {
            continue;
        };

        let flattened_value = match values.len() {
            1 => values.remove(0),
            _ => Value::Array(values),
        };
        flattened.insert(key, flattened_value);
    }

    flattened
}

fn single_entry(key: &str, value: &Value) -> Value {
    let mut entry = Map::with_capacity(1);
    entry.insert(key.to_string(), value.clone());
    Value::Object(entry)
}

/// Key to store a flattened element under, or `None` when the name is blank.
///
/// Blank names are `null`, `false`, zero, the empty string and any list or object.
fn flattened_key(name: &Value) -> Option<String> {
    match name {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("test record must be an object, got {other}"),
        }
    }

    fn normalized(value: Value) -> Value {
        Value::Object(normalize(record(value)))
    }

    #[test]
    fn test_flattens_name_value_pairs() {
        let input = json!({"Attrs": [{"Name": "a", "Value": 1}, {"Name": "b", "Value": 2}]});
        assert_eq!(normalized(input), json!({"Attrs": {"a": 1, "b": 2}}));
    }

    #[test]
    fn test_extra_fields_wrap_value() {
        let input = json!({"Attrs": [{"Name": "a", "Value": 1, "Unit": "ms"}]});
        assert_eq!(
            normalized(input),
            json!({"Attrs": {"a": [{"Value": 1}, {"Unit": "ms"}]}})
        );
    }

    #[test]
    fn test_non_flattenable_values_untouched() {
        let input = json!({"x": 5, "y": [1, 2, 3]});
        assert_eq!(normalized(input.clone()), input);
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let input = json!({"tags": [{"NAME": "env", "vAlUe": "prod"}]});
        assert_eq!(normalized(input), json!({"tags": {"env": "prod"}}));
    }

    #[test]
    fn test_last_name_wins() {
        let input = json!({"tags": [{"name": "first", "Name": "second", "Value": 1}]});
        // Three fields, so the value is wrapped.
        assert_eq!(
            normalized(input),
            json!({"tags": {"second": {"Value": 1}}})
        );
    }

    #[test]
    fn test_single_non_value_field_is_unwrapped_from_list() {
        let input = json!({"tags": [{"Name": "a", "Unit": "ms"}]});
        assert_eq!(normalized(input), json!({"tags": {"a": {"Unit": "ms"}}}));
    }

    #[test]
    fn test_name_only_element_flattens_to_empty_list() {
        let input = json!({"tags": [{"Name": "lonely"}]});
        assert_eq!(normalized(input), json!({"tags": {"lonely": []}}));
    }

    #[test]
    fn test_elements_without_name_are_dropped() {
        let input = json!({"tags": [{"Name": "a", "Value": 1}, {"Key": "b", "Value": 2}, 7]});
        assert_eq!(normalized(input), json!({"tags": {"a": 1}}));
    }

    #[test]
    fn test_list_without_any_named_element_is_kept() {
        let input = json!({"tags": [{"Key": "b", "Value": 2}, {"other": true}]});
        assert_eq!(normalized(input.clone()), input);
    }

    #[test]
    fn test_blank_names_are_ignored() {
        let input = json!({
            "tags": [
                {"Name": "", "Value": 1},
                {"Name": null, "Value": 2},
                {"Name": 0, "Value": 3},
                {"Name": false, "Value": 4},
                {"Name": ["a"], "Value": 5},
            ]
        });
        assert_eq!(normalized(input.clone()), input);
    }

    #[test]
    fn test_scalar_names_become_string_keys() {
        let input = json!({"tags": [{"Name": 7, "Value": "seven"}, {"Name": true, "Value": 1}]});
        assert_eq!(
            normalized(input),
            json!({"tags": {"7": "seven", "true": 1}})
        );
    }

    #[test]
    fn test_each_top_level_key_is_independent() {
        let input = json!({
            "host": "web-1",
            "metrics": [{"name": "latency", "value": 12}],
            "labels": ["a", "b"],
            "dims": [{"Name": "region", "Value": "eu"}],
        });
        assert_eq!(
            normalized(input),
            json!({
                "host": "web-1",
                "metrics": {"latency": 12},
                "labels": ["a", "b"],
                "dims": {"region": "eu"},
            })
        );
    }

    #[test]
    fn test_key_order_is_preserved() {
        let input = json!({"a": 1, "b": [{"Name": "x", "Value": 1}], "c": 3});
        let keys: Vec<String> = normalize(record(input)).keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ]
    }

    fn element() -> impl Strategy<Value = Value> {
        prop_oneof![
            scalar(),
            (
                prop_oneof![Just("Name"), Just("name"), Just("NAME"), Just("Key")],
                scalar(),
                prop::option::of(scalar()),
                prop::option::of(scalar()),
            )
                .prop_map(|(name_key, name, value, unit)| {
                    let mut fields = Map::new();
                    fields.insert(name_key.to_string(), name);
                    if let Some(value) = value {
                        fields.insert("Value".to_string(), value);
                    }
                    if let Some(unit) = unit {
                        fields.insert("Unit".to_string(), unit);
                    }
                    Value::Object(fields)
                }),
        ]
    }

    fn arbitrary_record() -> impl Strategy<Value = Record> {
        prop::collection::vec(
            (
                "[a-z]{1,4}",
                prop_oneof![scalar(), prop::collection::vec(element(), 0..5).prop_map(Value::Array)],
            ),
            0..6,
        )
        .prop_map(|entries| entries.into_iter().collect::<Record>())
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(input in arbitrary_record()) {
            let once = normalize(input);
            let twice = normalize(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalize_keeps_top_level_keys(input in arbitrary_record()) {
            let keys: Vec<String> = input.keys().cloned().collect();
            let output = normalize(input);
            let output_keys: Vec<String> = output.keys().cloned().collect();
            prop_assert_eq!(keys, output_keys);
        }
    }
}
