//! Normalization, hashing and comparison of attribute values.
//!
//! Provider values are compared after normalization: numbers compare
//! numerically (`1` equals `1.0`), set-valued attributes compare
//! order-insensitively, and object keys are sorted. Digests and the spec
//! hash are computed over the normalized form, so they are stable across
//! runs and independent of map ordering.

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::binding::ResourceBinding;

/// Normalize a value; `set` sorts array elements by their canonical form.
pub fn normalize(value: &Value, set: bool) -> Value {
    match value {
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(|v| normalize(v, false)).collect();
            if set {
                items.sort_by_cached_key(canonical);
                items.dedup();
            }
            Value::Array(items)
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    out.insert(key.clone(), normalize(v, false));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Number {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                return Number::from(f as i64);
            }
        }
    }
    n.clone()
}

/// Canonical JSON text of an already normalized value
fn canonical(value: &Value) -> String {
    value.to_string()
}

/// Whether two values are equal after normalization
pub fn values_equal(a: &Value, b: &Value, set: bool) -> bool {
    normalize(a, set) == normalize(b, set)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest of one attribute's normalized value
pub fn digest(key: &str, value: &Value, set: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical(&normalize(value, set)).as_bytes());
    hex(&hasher.finalize())
}

/// Per-attribute digests of a desired attribute set
pub fn digests(binding: &ResourceBinding, attrs: &Map<String, Value>) -> BTreeMap<String, String> {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), digest(k, v, is_set(binding, k))))
        .collect()
}

/// Hash of a whole desired attribute set, derived from its digests
pub fn spec_hash(digests: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, digest) in digests {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    hex(&hasher.finalize())
}

/// Whether the attribute `key` compares with set semantics
pub fn is_set(binding: &ResourceBinding, key: &str) -> bool {
    binding.by_key(key).is_some_and(|f| f.set_semantics)
}
