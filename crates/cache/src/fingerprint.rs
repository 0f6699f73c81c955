use serde::Serialize;
use serde_json::Value;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Render a structured value into a canonical string: object keys
/// sorted and recursed, array order preserved, primitives stringified.
/// Two values with the same key/value pairs canonicalize identically
/// regardless of insertion order.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's map preserves insertion order by default,
            // so sort explicitly before folding.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(key);
                out.push_str("\":");
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// Fold a serializable key into a small integer hash (FNV-1a over the
/// canonical rendering). Serialization failure maps to the hash of the
/// empty canonical form rather than an error; the cache stays total.
pub fn fingerprint<K: Serialize>(key: &K) -> u64 {
    let value = serde_json::to_value(key).unwrap_or(Value::Null);
    let canonical = canonicalize(&value);
    let mut hash = FNV_OFFSET;
    for byte in canonical.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_object_key_order_irrelevant() {
        let a = json!({"email": "x@y.z", "newsletter": "1"});
        let b = json!({"newsletter": "1", "email": "x@y.z"});
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_array_order_preserved() {
        let a = json!(["a", "b"]);
        let b = json!(["b", "a"]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_nested_objects_sorted() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_distinct_values_distinct_hashes() {
        let a = json!({"field": "1"});
        let b = json!({"field": "0"});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_hashmap_key_is_stable() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        let direct = json!({"a": "1", "b": "2"});
        assert_eq!(fingerprint(&map), fingerprint(&direct));
    }
}
