//! Deterministic in-process merge of partial results.
//!
//! These are the same rules the synthesis instruction gives the model,
//! applied mechanically:
//!
//! - list fields: union of all items in input order, duplicates (by value)
//!   removed, nested lists flattened one level
//! - scalar and object fields: the first non-null value in input order
//! - a field that is null or absent everywhere: `null`
//!
//! Used by [`crate::SynthesisStrategy::Local`], and as a reference for what
//! the inference-based synthesis is asked to do.

use serde_json::{Map, Value};

/// Merge partial results, earliest first.
///
/// When every input is a JSON object the rules apply per top-level key;
/// otherwise they apply to the inputs as a whole.
pub fn merge_partials(partials: &[Value]) -> Value {
    if partials.is_empty() {
        return Value::Null;
    }
    if !partials.iter().all(Value::is_object) {
        return merge_field(partials.iter());
    }

    let mut keys: Vec<&String> = Vec::new();
    for obj in partials.iter().filter_map(Value::as_object) {
        for key in obj.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let mut merged = Map::new();
    for key in keys {
        let values = partials.iter().filter_map(|p| p.get(key.as_str()));
        merged.insert(key.clone(), merge_field(values));
    }
    Value::Object(merged)
}

/// Merge the values one field takes across partials.
fn merge_field<'a>(values: impl Iterator<Item = &'a Value> + Clone) -> Value {
    if values.clone().any(Value::is_array) {
        let mut items: Vec<Value> = Vec::new();
        for value in values {
            match value {
                Value::Array(list) => {
                    for item in list {
                        match item {
                            Value::Array(inner) => inner.iter().for_each(|v| push_unique(&mut items, v)),
                            other => push_unique(&mut items, other),
                        }
                    }
                }
                Value::Null => {}
                scalar => push_unique(&mut items, scalar),
            }
        }
        return Value::Array(items);
    }
    values
        .into_iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null)
}

fn push_unique(items: &mut Vec<Value>, value: &Value) {
    if value.is_null() || items.contains(value) {
        return;
    }
    items.push(value.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lists_union_without_duplicates() {
        let merged = merge_partials(&[json!({"a": [1, 2]}), json!({"a": [2, 3]})]);
        assert_eq!(merged, json!({"a": [1, 2, 3]}));
    }

    #[test]
    fn first_non_null_scalar_wins() {
        let merged = merge_partials(&[json!({"b": "x"}), json!({"b": "y"})]);
        assert_eq!(merged, json!({"b": "x"}));
        let merged = merge_partials(&[json!({"b": null}), json!({"b": "y"})]);
        assert_eq!(merged, json!({"b": "y"}));
    }

    #[test]
    fn all_null_stays_null() {
        let merged = merge_partials(&[json!({"c": null}), json!({"c": null})]);
        assert_eq!(merged, json!({"c": null}));
    }

    #[test]
    fn absent_fields_are_filled_from_later_partials() {
        let merged = merge_partials(&[json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn nested_lists_are_flattened() {
        let merged = merge_partials(&[json!({"t": [["x", "y"]]}), json!({"t": ["y", "z"]})]);
        assert_eq!(merged, json!({"t": ["x", "y", "z"]}));
    }

    #[test]
    fn objects_are_not_deep_merged() {
        let merged = merge_partials(&[
            json!({"hq": {"city": "Lyon"}}),
            json!({"hq": {"city": "Paris", "country": "FR"}}),
        ]);
        assert_eq!(merged, json!({"hq": {"city": "Lyon"}}));
    }

    #[test]
    fn duplicate_objects_in_lists_collapse() {
        let merged = merge_partials(&[
            json!({"team": [{"name": "Ana"}]}),
            json!({"team": [{"name": "Ana"}, {"name": "Bo"}]}),
        ]);
        assert_eq!(merged, json!({"team": [{"name": "Ana"}, {"name": "Bo"}]}));
    }

    #[test]
    fn scalar_next_to_list_joins_the_list() {
        let merged = merge_partials(&[json!({"k": "a"}), json!({"k": ["b"]})]);
        assert_eq!(merged, json!({"k": ["a", "b"]}));
    }

    #[test]
    fn single_partial_is_identity() {
        let p = json!({"a": [1], "b": "x", "c": null});
        assert_eq!(merge_partials(std::slice::from_ref(&p)), p);
    }

    #[test]
    fn non_object_inputs() {
        assert_eq!(merge_partials(&[json!([1]), json!([1, 2])]), json!([1, 2]));
        assert_eq!(merge_partials(&[json!(null), json!("x")]), json!("x"));
        assert_eq!(merge_partials(&[]), Value::Null);
    }
}
