//! Portable-tree conventions and dotted-path plumbing.
//!
//! A portable tree is an ordinary JSON tree where `"_id"` marks the serialized
//! entity's internal id and `{"_ref": token}` stands in for a key into another
//! entity. Deep rules and deferred patches address leaves of arbitrarily
//! nested sub-values through dotted paths (`data.resources.0.id`), so the
//! flatten/set helpers here are shared by both engines and the resolver.

use serde_json::Value;

/// Field carrying a serialized entity's internal id.
pub const ID_KEY: &str = "_id";

/// Key of a single-field object standing in for an entity reference.
pub const REF_KEY: &str = "_ref";

/// Object form used for entity rows and portable trees alike.
pub type Map = serde_json::Map<String, Value>;

/// Merge two dotted paths, tolerating an empty side.
#[must_use]
pub fn join_paths(left: &str, right: &str) -> String {
    if left.is_empty() {
        right.to_string()
    } else if right.is_empty() {
        left.to_string()
    } else {
        format!("{left}.{right}")
    }
}

/// Split a dotted path into its root field and the remainder, if any.
#[must_use]
pub fn split_root(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (path, None),
    }
}

/// Build the `{"_ref": token}` object form of a reference.
#[must_use]
pub fn make_ref(token: &str) -> Value {
    let mut object = Map::new();
    object.insert(REF_KEY.to_string(), Value::String(token.to_string()));
    Value::Object(object)
}

/// Extract the token from a `{"_ref": token}` object, if the value is one.
#[must_use]
pub fn ref_token(value: &Value) -> Option<&str> {
    value.as_object()?.get(REF_KEY)?.as_str()
}

/// Flatten a tree into `(dotted path, leaf)` pairs.
///
/// Scalars and empty containers are leaves; non-empty objects and arrays
/// recurse, arrays contributing numeric segments.
#[must_use]
pub fn flatten(value: &Value) -> Vec<(String, Value)> {
    let mut leaves = Vec::new();
    flatten_into(value, "", &mut leaves);
    leaves
}

fn flatten_into(value: &Value, path: &str, leaves: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (field, child) in fields {
                flatten_into(child, &join_paths(path, field), leaves);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, &join_paths(path, &index.to_string()), leaves);
            }
        }
        leaf => leaves.push((path.to_string(), leaf.clone())),
    }
}

/// Write `leaf` into `target` at a dotted path, creating intermediate
/// containers as needed. Numeric segments address (and extend) arrays;
/// everything else addresses object fields. A scalar in the way of a
/// container segment is replaced.
pub fn set_path(target: &mut Value, path: &str, leaf: Value) {
    let (segment, rest) = split_root(path);

    let slot = if let Ok(index) = segment.parse::<usize>() {
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        let Value::Array(items) = target else {
            unreachable!("target was just coerced to an array")
        };
        while items.len() <= index {
            items.push(Value::Null);
        }
        &mut items[index]
    } else {
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        let Value::Object(fields) = target else {
            unreachable!("target was just coerced to an object")
        };
        fields.entry(segment.to_string()).or_insert(Value::Null)
    };

    match rest {
        Some(rest) => set_path(slot, rest, leaf),
        None => *slot = leaf,
    }
}

/// Loose scalar comparison between a discriminator value and a case label,
/// mirroring the weak equality the conditions rule historically used:
/// strings compare directly, numbers and bools against their canonical
/// rendering (with `1`/`0` accepted for bools).
#[must_use]
pub fn loose_case_eq(value: &Value, case: &str) -> bool {
    match value {
        Value::String(s) => s == case,
        Value::Number(n) => n.to_string() == case,
        Value::Bool(b) => {
            let (word, digit) = if *b { ("true", "1") } else { ("false", "0") };
            case == word || case == digit
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_paths_tolerates_empty_sides() {
        assert_eq!(join_paths("", "a"), "a");
        assert_eq!(join_paths("a", ""), "a");
        assert_eq!(join_paths("a", "b.c"), "a.b.c");
    }

    #[test]
    fn flatten_produces_dotted_leaves() {
        let value = json!({
            "resources": [{"id": 5, "transforms": []}],
            "name": "x",
        });

        let mut leaves = flatten(&value);
        leaves.sort_by(|(a, _), (b, _)| a.cmp(b));

        assert_eq!(
            leaves,
            vec![
                ("name".to_string(), json!("x")),
                ("resources.0.id".to_string(), json!(5)),
                ("resources.0.transforms".to_string(), json!([])),
            ]
        );
    }

    #[test]
    fn set_path_creates_intermediate_containers() {
        let mut value = Value::Null;
        set_path(&mut value, "a.0.b", json!(7));
        assert_eq!(value, json!({"a": [{"b": 7}]}));
    }

    #[test]
    fn set_path_preserves_siblings() {
        let mut value = json!({"a": {"keep": true, "b": 1}});
        set_path(&mut value, "a.b", json!(2));
        assert_eq!(value, json!({"a": {"keep": true, "b": 2}}));
    }

    #[test]
    fn set_path_extends_arrays_with_nulls() {
        let mut value = json!({"xs": [1]});
        set_path(&mut value, "xs.3", json!(4));
        assert_eq!(value, json!({"xs": [1, null, null, 4]}));
    }

    #[test]
    fn ref_round_trip() {
        let reference = make_ref("pages_3");
        assert_eq!(ref_token(&reference), Some("pages_3"));
        assert_eq!(ref_token(&json!({"other": 1})), None);
        assert_eq!(ref_token(&json!(3)), None);
    }

    #[test]
    fn loose_case_eq_covers_scalars() {
        assert!(loose_case_eq(&json!("foo"), "foo"));
        assert!(loose_case_eq(&json!(1), "1"));
        assert!(loose_case_eq(&json!(true), "true"));
        assert!(loose_case_eq(&json!(true), "1"));
        assert!(!loose_case_eq(&json!(null), "null"));
    }
}
