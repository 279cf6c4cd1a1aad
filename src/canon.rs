//! Canonical JSON encoder (§4.2).
//!
//! For any JSON-shaped value: object keys are sorted lexicographically
//! (byte order), no whitespace, numbers/strings/booleans/null serialized
//! per RFC 8259, nested objects/arrays recurse.
//!
//! Implementation round-trips through [`serde_json::Value`] first (via
//! `serde_json::to_value`) to normalize numeric forms, then re-emits with
//! sorted keys — general over any `Serialize` input, not only the specific
//! descriptor/audit-record shapes that happen to call it.

use serde::Serialize;
use serde_json::Value;

/// Serialize `value` to its canonical JSON byte form.
///
/// # Errors
/// Returns an error if `value` cannot be converted to a [`Value`].
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    let mut out = Vec::new();
    write_canonical(&v, &mut out);
    Ok(out)
}

/// Serialize `value` to a canonical JSON string.
///
/// # Errors
/// Returns an error if `value` cannot be converted to a [`Value`].
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    // Canonical output is always valid UTF-8 JSON text.
    Ok(String::from_utf8(bytes).unwrap_or_default())
}

fn write_canonical(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json_string(k, out);
                out.push(b':');
                write_canonical(&map[*k], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        // Scalars: serde_json already emits these with no extraneous
        // whitespace and RFC-8259-conformant number/string encoding.
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            if let Ok(bytes) = serde_json::to_vec(v) {
                out.extend_from_slice(&bytes);
            }
        }
    }
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    // Reuse serde_json's own string escaping rather than reimplementing
    // RFC 8259 escape rules.
    if let Ok(bytes) = serde_json::to_vec(s) {
        out.extend_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2, "c": 3});
        let s = {
            let mut out = Vec::new();
            write_canonical(&v, &mut out);
            String::from_utf8(out).unwrap()
        };
        assert_eq!(s, r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn no_whitespace() {
        let v = json!({"x": [1, 2, 3], "y": "hello"});
        let mut out = Vec::new();
        write_canonical(&v, &mut out);
        let s = String::from_utf8(out).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn nested_objects_sorted_recursively() {
        let v = json!({"outer_b": {"z": 1, "a": 2}, "outer_a": 3});
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, r#"{"outer_a":3,"outer_b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn deterministic_across_calls() {
        let v = json!({"k3": 1, "k1": 2, "k2": {"nested_b": true, "nested_a": false}});
        let a = to_canonical_bytes(&v).unwrap();
        let b = to_canonical_bytes(&v).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct A {
            z: i32,
            a: i32,
        }
        let s = to_canonical_string(&A { z: 1, a: 2 }).unwrap();
        assert_eq!(s, r#"{"a":2,"z":1}"#);
    }

    #[test]
    fn arrays_preserve_order() {
        let v = json!([3, 1, 2]);
        let s = to_canonical_string(&v).unwrap();
        assert_eq!(s, "[3,1,2]");
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"note": "line1\nline2\t\"quoted\""});
        let s = to_canonical_string(&v).unwrap();
        assert!(s.contains(r"\n"));
        assert!(s.contains(r#"\""#));
    }

    #[cfg(feature = "proptests")]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i32>().prop_map(|n| json!(n)),
                "[a-z]{0,8}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 64, 8, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn canonical_encoding_is_deterministic(v in arb_value()) {
                let a = to_canonical_bytes(&v).unwrap();
                let b = to_canonical_bytes(&v).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn object_key_order_does_not_affect_output(v in arb_value()) {
                // Re-inserting the same object's keys in reverse order must not
                // change the canonical output.
                if let Value::Object(map) = &v {
                    let reversed: serde_json::Map<String, Value> =
                        map.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
                    let a = to_canonical_bytes(&v).unwrap();
                    let b = to_canonical_bytes(&Value::Object(reversed)).unwrap();
                    prop_assert_eq!(a, b);
                }
            }
        }
    }
}
