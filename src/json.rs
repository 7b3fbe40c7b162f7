//! Canonical-JSON hashing and the "never alias mutable state" clone helper.
//!
//! `serde_json`'s `preserve_order` feature keeps `Value::Object` in insertion
//! order so the tool catalog round-trips with source fidelity; hashing and
//! equality need a separate, explicitly key-sorted representation, which is
//! what `canonicalize` produces.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deep-clones a JSON value. Named so call sites make the "cache/history/
/// catalog reads must not alias mutable state" invariant visible rather than
/// relying on an incidental `.clone()`.
pub fn clone_json(value: &Value) -> Value {
    value.clone()
}

/// Recursively sorts object keys (arrays keep their order) and serializes to
/// a compact string. This is the hashing/equality preimage used throughout
/// the proxy (tools-hash, delta diffing, cache-key argument hashing).
pub fn canonicalize(value: &Value) -> String {
    let sorted = sort_keys(value);
    serde_json::to_string(&sorted).expect("canonical value always serializes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// `sha256:<64 hex lowercase>` over the canonical-JSON preimage.
pub fn sha256_hex(preimage: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// `sha256:<64 hex>` hash of the canonical form of `value`, in the
/// `"sha256:<64 hex>"` wire format used for tools-hash and cache keys.
pub fn tools_hash(value: &Value) -> String {
    format!("sha256:{}", sha256_hex(&canonicalize(value)))
}

/// Parses a `"sha256:<64 hex>"` literal; returns `None` (treated as absent,
/// per spec §7 "extension-parse errors") for any other shape.
pub fn parse_tools_hash(literal: &str) -> Option<&str> {
    let rest = literal.strip_prefix("sha256:")?;
    if rest.len() == 64 && rest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(rest)
    } else {
        None
    }
}

/// Short (12 hex char) digest used for the result-compression shared key
/// dictionary's `keysRef`.
pub fn short_digest(preimage: &str) -> String {
    sha256_hex(preimage)[..12].to_string()
}

/// A rough token-count estimate shared by the compression accept-gates and
/// the runtime-metrics surface: `max(1, floor(len/4))`, the same heuristic
/// spec.md §4.8 names explicitly.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_is_key_order_independent() {
        let a = json!([{"name": "x", "inputSchema": {"type": "object", "properties": {"a": {"type": "string"}}}}]);
        let b = json!([{"inputSchema": {"properties": {"a": {"type": "string"}}, "type": "object"}, "name": "x"}]);
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(tools_hash(&a), tools_hash(&b));
    }

    #[test]
    fn canonicalize_preserves_array_order() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn tools_hash_is_well_formed() {
        let hash = tools_hash(&json!({"tools": []}));
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);
        assert!(parse_tools_hash(&hash).is_some());
    }

    #[test]
    fn parse_tools_hash_rejects_malformed_literals() {
        assert!(parse_tools_hash("sha1:aaaa").is_none());
        assert!(parse_tools_hash("sha256:not-hex").is_none());
        assert!(parse_tools_hash("sha256:abcd").is_none());
        assert!(parse_tools_hash("").is_none());
    }

    #[test]
    fn estimate_tokens_floors_to_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }
}
