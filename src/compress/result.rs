//! Result compression (`lapc-json-v1`): key aliasing plus columnar-row
//! packing for homogeneous object arrays, gated on an estimated
//! compressibility score and accepted only when projected token savings
//! clear the configured floor.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::{ResultCompressionConfig, ResultCompressionMode};
use crate::json::{canonicalize, estimate_tokens, short_digest};

pub const ENCODING: &str = "lapc-json-v1";

#[derive(Debug, Clone)]
pub struct CompressionStats {
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub saved_bytes: usize,
    pub saved_ratio: f64,
    pub saved_tokens: usize,
}

pub enum ResultCompressionOutcome {
    Applied { envelope: Value, stats: CompressionStats },
    Skipped,
}

/// Tracks which alias tables have already been shipped to the client in
/// this session, so repeat tables can be referenced by digest instead of
/// re-sent inline. Session-scoped state, held in [`crate::state::Store`].
#[derive(Default)]
pub struct KeyDictionary {
    reuse_counts: HashMap<String, u64>,
}

impl KeyDictionary {
    /// Returns `(digest, ship_keys_inline)`. The first sighting of a table
    /// and every `bootstrap_interval`th reuse after that ship the keys
    /// inline; all other reuses return the digest alone.
    pub fn lookup_or_insert(&mut self, alias_table: &Value, bootstrap_interval: u64) -> (String, bool) {
        let digest = short_digest(&canonicalize(alias_table));
        let count = self.reuse_counts.entry(digest.clone()).or_insert(0);
        let ship_inline = *count == 0 || (bootstrap_interval > 0 && *count % bootstrap_interval == 0);
        *count += 1;
        (digest, ship_inline)
    }
}

fn mode_min_occurrences(mode: ResultCompressionMode) -> u64 {
    match mode {
        ResultCompressionMode::Aggressive => 1,
        _ => 2,
    }
}

fn mode_str(mode: ResultCompressionMode) -> &'static str {
    match mode {
        ResultCompressionMode::Off => "off",
        ResultCompressionMode::Balanced => "balanced",
        ResultCompressionMode::Aggressive => "aggressive",
    }
}

fn count_keys(value: &Value, counts: &mut HashMap<String, u64>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                *counts.entry(key.clone()).or_insert(0) += 1;
                count_keys(child, counts);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| count_keys(item, counts)),
        _ => {}
    }
}

fn count_scalars(value: &Value, counts: &mut HashMap<String, u64>) {
    match value {
        Value::Object(map) => map.values().for_each(|v| count_scalars(v, counts)),
        Value::Array(items) => items.iter().for_each(|item| count_scalars(item, counts)),
        Value::Null => {}
        scalar => {
            *counts.entry(scalar.to_string()).or_insert(0) += 1;
        }
    }
}

fn is_homogeneous_object_array(items: &[Value]) -> bool {
    let Some(first) = items.first().and_then(Value::as_object) else {
        return false;
    };
    let mut keys: Vec<&String> = first.keys().collect();
    keys.sort();
    items.iter().all(|item| {
        item.as_object().is_some_and(|obj| {
            obj.len() == keys.len() && keys.iter().all(|k| obj.contains_key(k.as_str()))
        })
    })
}

fn count_homogeneous_arrays(value: &Value) -> (u64, u64) {
    let mut homogeneous = 0u64;
    let mut total = 0u64;
    fn walk(value: &Value, homogeneous: &mut u64, total: &mut u64) {
        match value {
            Value::Array(items) => {
                if items.len() >= 2 {
                    *total += 1;
                    if is_homogeneous_object_array(items) {
                        *homogeneous += 1;
                    }
                }
                items.iter().for_each(|i| walk(i, homogeneous, total));
            }
            Value::Object(map) => map.values().for_each(|v| walk(v, homogeneous, total)),
            _ => {}
        }
    }
    walk(value, &mut homogeneous, &mut total);
    (homogeneous, total)
}

/// Heuristic combining repeated-key ratio, repeated-scalar ratio, and
/// homogeneous-array ratio, averaged into a single `[0, 1]` score.
pub fn estimate_compressibility(value: &Value) -> f64 {
    let mut key_counts = HashMap::new();
    count_keys(value, &mut key_counts);
    let total_keys: u64 = key_counts.values().sum();
    let repeated_key_ratio = if total_keys > 0 {
        1.0 - (key_counts.len() as f64 / total_keys as f64)
    } else {
        0.0
    };

    let mut scalar_counts = HashMap::new();
    count_scalars(value, &mut scalar_counts);
    let total_scalars: u64 = scalar_counts.values().sum();
    let repeated_scalar_ratio = if total_scalars > 0 {
        1.0 - (scalar_counts.len() as f64 / total_scalars as f64)
    } else {
        0.0
    };

    let (homogeneous, total_arrays) = count_homogeneous_arrays(value);
    let homogeneous_array_ratio = if total_arrays > 0 {
        homogeneous as f64 / total_arrays as f64
    } else {
        0.0
    };

    (repeated_key_ratio + repeated_scalar_ratio + homogeneous_array_ratio) / 3.0
}

fn build_alias_table(counts: &HashMap<String, u64>, min_occurrences: u64) -> Vec<(String, String)> {
    let mut candidates: Vec<(&String, &u64)> = counts
        .iter()
        .filter(|(key, count)| **count >= min_occurrences && key.len() > 2)
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(a.1).then_with(|| b.0.len().cmp(&a.0.len())));

    let mut aliases = Vec::new();
    for (index, (key, _)) in candidates.into_iter().enumerate() {
        let alias = format!("k{index}");
        if alias.len() < key.len() {
            aliases.push((alias, key.clone()));
        }
    }
    aliases
}

fn transform(value: &Value, alias_map: &HashMap<&str, &str>, cfg: &ResultCompressionConfig) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let renamed = alias_map.get(key.as_str()).copied().unwrap_or(key);
                out.insert(renamed.to_string(), transform(child, alias_map, cfg));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if items.len() >= cfg.columnar_min_rows && is_homogeneous_object_array(items) {
                if let Some(columnar) = try_columnar(items, alias_map, cfg) {
                    return columnar;
                }
            }
            Value::Array(items.iter().map(|item| transform(item, alias_map, cfg)).collect())
        }
        other => other.clone(),
    }
}

fn try_columnar(items: &[Value], alias_map: &HashMap<&str, &str>, cfg: &ResultCompressionConfig) -> Option<Value> {
    let first = items.first()?.as_object()?;
    let mut keys: Vec<&String> = first.keys().collect();
    if keys.len() < cfg.columnar_min_fields {
        return None;
    }
    keys.sort();

    let columns: Vec<Value> = keys
        .iter()
        .map(|key| Value::String(alias_map.get(key.as_str()).copied().unwrap_or(key).to_string()))
        .collect();

    let rows: Vec<Value> = items
        .iter()
        .map(|item| {
            let obj = item.as_object().expect("homogeneity checked by caller");
            Value::Array(
                keys.iter()
                    .map(|key| transform(&obj[key.as_str()], alias_map, cfg))
                    .collect(),
            )
        })
        .collect();

    Some(json!({"~t": {"c": columns, "r": rows}}))
}

/// Attempts to compress `payload`. Returns [`ResultCompressionOutcome::Skipped`]
/// whenever the pre-gate, compressibility gate, or accept-gate fails.
pub fn compress_result(
    payload: &Value,
    mode: ResultCompressionMode,
    cfg: &ResultCompressionConfig,
    dictionary: &mut KeyDictionary,
) -> ResultCompressionOutcome {
    if mode == ResultCompressionMode::Off {
        return ResultCompressionOutcome::Skipped;
    }

    let original = serde_json::to_string(payload).unwrap_or_default();
    let original_bytes = original.len();
    if original_bytes < cfg.min_payload_bytes {
        return ResultCompressionOutcome::Skipped;
    }
    if estimate_compressibility(payload) < cfg.min_compressibility {
        return ResultCompressionOutcome::Skipped;
    }

    let mut key_counts = HashMap::new();
    count_keys(payload, &mut key_counts);
    let alias_table = build_alias_table(&key_counts, mode_min_occurrences(mode));
    if alias_table.is_empty() {
        return ResultCompressionOutcome::Skipped;
    }
    let alias_lookup: HashMap<&str, &str> = alias_table
        .iter()
        .map(|(alias, original)| (original.as_str(), alias.as_str()))
        .collect();

    let data = transform(payload, &alias_lookup, cfg);
    let compressed = serde_json::to_string(&data).unwrap_or_default();
    let compressed_bytes = compressed.len();

    let saved_bytes = original_bytes.saturating_sub(compressed_bytes);
    let saved_ratio = if original_bytes > 0 {
        saved_bytes as f64 / original_bytes as f64
    } else {
        0.0
    };

    let tokens_original = estimate_tokens(&original);
    let tokens_compressed = estimate_tokens(&compressed);
    let saved_tokens = tokens_original.saturating_sub(tokens_compressed);
    let required = cfg
        .min_token_savings_abs
        .max((tokens_original as f64 * cfg.min_token_savings_ratio).floor() as usize);
    if saved_tokens < required {
        return ResultCompressionOutcome::Skipped;
    }

    let keys_object: Value = Value::Object(
        alias_table
            .iter()
            .map(|(alias, original)| (alias.clone(), Value::String(original.clone())))
            .collect(),
    );

    let mut envelope = json!({
        "encoding": ENCODING,
        "compressed": true,
        "mode": mode_str(mode),
        "originalBytes": original_bytes,
        "compressedBytes": compressed_bytes,
        "savedBytes": saved_bytes,
        "savedRatio": saved_ratio,
        "data": data,
    });

    if cfg.shared_key_dictionary {
        let (digest, ship_inline) = dictionary.lookup_or_insert(&keys_object, cfg.key_bootstrap_interval);
        envelope["keysRef"] = Value::String(digest);
        if ship_inline {
            envelope["keys"] = keys_object;
        }
    } else {
        envelope["keys"] = keys_object;
    }

    ResultCompressionOutcome::Applied {
        envelope,
        stats: CompressionStats {
            original_bytes,
            compressed_bytes,
            saved_bytes,
            saved_ratio,
            saved_tokens,
        },
    }
}

/// Inverts a `lapc-json-v1` envelope back to the original JSON value.
/// Used by the round-trip test and available for any client-side helper
/// the proxy ships alongside the wire format.
pub fn decompress_result(envelope: &Value) -> Option<Value> {
    let data = envelope.get("data")?;
    let keys = envelope.get("keys")?.as_object()?;
    let alias_map: HashMap<&str, &str> = keys
        .iter()
        .map(|(alias, original)| (alias.as_str(), original.as_str().unwrap_or(alias)))
        .collect();
    Some(invert(data, &alias_map))
}

fn invert(value: &Value, alias_map: &HashMap<&str, &str>) -> Value {
    if let Some(table) = value.get("~t") {
        let columns: Vec<&str> = table
            .get("c")
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let rows = table.get("r").and_then(Value::as_array).cloned().unwrap_or_default();
        return Value::Array(
            rows.into_iter()
                .map(|row| {
                    let values = row.as_array().cloned().unwrap_or_default();
                    let mut obj = Map::new();
                    for (column, cell) in columns.iter().zip(values.into_iter()) {
                        let original_key = alias_map.get(*column).copied().unwrap_or(column).to_string();
                        obj.insert(original_key, invert(&cell, alias_map));
                    }
                    Value::Object(obj)
                })
                .collect(),
        );
    }

    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let original_key = alias_map.get(key.as_str()).copied().unwrap_or(key).to_string();
                out.insert(original_key, invert(child, alias_map));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| invert(item, alias_map)).collect()),
        other => other.clone(),
    }
}

/// Drops `result.content[]` text items that are redundant with the
/// already-delivered structured payload, replacing them with a single
/// placeholder if nothing is left.
pub fn dedupe_redundant_content(result: &mut Value, original_structured: &Value) {
    let Some(content) = result.get_mut("content").and_then(Value::as_array_mut) else {
        return;
    };

    content.retain(|item| {
        let redundant = item.get("type").and_then(Value::as_str) == Some("text")
            && item
                .get("text")
                .and_then(Value::as_str)
                .and_then(|text| serde_json::from_str::<Value>(text).ok())
                .map(|parsed| &parsed == original_structured)
                .unwrap_or(false);
        !redundant
    });

    if content.is_empty() {
        *content = vec![json!({"type": "text", "text": "[result available via structuredContent]"})];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggressive_cfg() -> ResultCompressionConfig {
        ResultCompressionConfig {
            enabled: true,
            mode: ResultCompressionMode::Aggressive,
            min_payload_bytes: 0,
            min_compressibility: 0.0,
            columnar_min_rows: 3,
            columnar_min_fields: 2,
            min_token_savings_abs: 0,
            min_token_savings_ratio: 0.0,
            shared_key_dictionary: true,
            key_bootstrap_interval: 50,
        }
    }

    #[test]
    fn compresses_homogeneous_repo_array_and_round_trips() {
        let payload = json!({"repositories": [
            {"repository_name": "alpha", "repository_id": 1},
            {"repository_name": "beta", "repository_id": 2},
            {"repository_name": "gamma", "repository_id": 3},
        ]});
        let mut dictionary = KeyDictionary::default();
        let outcome = compress_result(&payload, ResultCompressionMode::Aggressive, &aggressive_cfg(), &mut dictionary);
        match outcome {
            ResultCompressionOutcome::Applied { envelope, .. } => {
                assert_eq!(envelope["compressed"], json!(true));
                assert!(envelope["keys"].as_object().unwrap().len() > 0);
                let restored = decompress_result(&envelope).unwrap();
                assert_eq!(restored, payload);
            }
            ResultCompressionOutcome::Skipped => panic!("expected compression to apply"),
        }
    }

    #[test]
    fn below_min_payload_bytes_is_skipped() {
        let mut cfg = aggressive_cfg();
        cfg.min_payload_bytes = 10_000;
        let mut dictionary = KeyDictionary::default();
        let outcome = compress_result(&json!({"a": 1}), ResultCompressionMode::Aggressive, &cfg, &mut dictionary);
        assert!(matches!(outcome, ResultCompressionOutcome::Skipped));
    }

    #[test]
    fn shared_dictionary_omits_keys_on_reuse_until_bootstrap_interval() {
        let mut cfg = aggressive_cfg();
        cfg.key_bootstrap_interval = 2;
        let payload = json!({"repositories": [
            {"repository_name": "alpha", "repository_id": 1},
            {"repository_name": "beta", "repository_id": 2},
            {"repository_name": "gamma", "repository_id": 3},
        ]});
        let mut dictionary = KeyDictionary::default();

        let first = compress_result(&payload, ResultCompressionMode::Aggressive, &cfg, &mut dictionary);
        let Ok(first_envelope) = (match first {
            ResultCompressionOutcome::Applied { envelope, .. } => Ok(envelope),
            ResultCompressionOutcome::Skipped => Err(()),
        }) else {
            panic!("expected first call to compress");
        };
        assert!(first_envelope.get("keys").is_some());

        let second = compress_result(&payload, ResultCompressionMode::Aggressive, &cfg, &mut dictionary);
        let ResultCompressionOutcome::Applied { envelope: second_envelope, .. } = second else {
            panic!("expected second call to compress");
        };
        assert!(second_envelope.get("keys").is_none(), "reuse should omit inline keys");

        let third = compress_result(&payload, ResultCompressionMode::Aggressive, &cfg, &mut dictionary);
        let ResultCompressionOutcome::Applied { envelope: third_envelope, .. } = third else {
            panic!("expected third call to compress");
        };
        assert!(third_envelope.get("keys").is_some(), "bootstrap interval should re-ship keys");
    }

    #[test]
    fn dedupe_redundant_content_collapses_to_placeholder() {
        let structured = json!({"a": 1});
        let mut result = json!({
            "structuredContent": structured,
            "content": [{"type": "text", "text": serde_json::to_string(&structured).unwrap()}]
        });
        dedupe_redundant_content(&mut result, &structured);
        let content = result["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["text"], json!("[result available via structuredContent]"));
    }
}
