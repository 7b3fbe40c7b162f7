//! Delta engine (`lapc-delta-v1`): canonical diff between a history entry
//! and the current payload, gated on patch size and savings, with periodic
//! full snapshots to bound unbounded patch chains.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::DeltaResponsesConfig;
use crate::json::{canonicalize, estimate_tokens, sha256_hex};

pub const ENCODING: &str = "lapc-delta-v1";

pub enum DeltaOutcome {
    Unchanged { current_hash: String },
    Patch { envelope: Value },
    Full { payload: Value },
}

/// Per-key successful-delta counters, used to force a full snapshot every
/// `snapshot_interval` patches. Session-scoped, held in
/// [`crate::state::Store`].
#[derive(Default)]
pub struct DeltaCounters {
    counts: HashMap<String, u64>,
}

impl DeltaCounters {
    /// Increments the counter for `key`; returns `true` (and resets it) once
    /// `snapshot_interval` successful patches have accumulated.
    fn record_and_check(&mut self, key: &str, snapshot_interval: u64) -> bool {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        if snapshot_interval > 0 && *count >= snapshot_interval {
            *count = 0;
            true
        } else {
            false
        }
    }
}

fn diff(previous: &Value, current: &Value, path: &mut Vec<Value>, ops: &mut Vec<Value>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            let mut keys: Vec<&String> = prev_map.keys().chain(curr_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(Value::String(key.clone()));
                match (prev_map.get(key), curr_map.get(key)) {
                    (Some(p), Some(c)) => diff(p, c, path, ops),
                    (Some(_), None) => ops.push(json!({"op": "delete", "path": path.clone()})),
                    (None, Some(c)) => ops.push(json!({"op": "set", "path": path.clone(), "value": c})),
                    (None, None) => unreachable!("key came from one of the two maps"),
                }
                path.pop();
            }
        }
        (Value::Array(prev_items), Value::Array(curr_items)) if prev_items.len() == curr_items.len() => {
            for (index, (p, c)) in prev_items.iter().zip(curr_items.iter()).enumerate() {
                path.push(Value::from(index as u64));
                diff(p, c, path, ops);
                path.pop();
            }
        }
        (a, b) => {
            if a != b {
                ops.push(json!({"op": "set", "path": path.clone(), "value": b}));
            }
        }
    }
}

/// Builds a delta from `previous` to `current`, or decides to reject it in
/// favor of a full payload per the size/savings gates, or forces a periodic
/// full snapshot via `counters`.
pub fn create_delta(
    previous: &Value,
    current: &Value,
    key: &str,
    cfg: &DeltaResponsesConfig,
    counters: &mut DeltaCounters,
) -> DeltaOutcome {
    let prev_canon = canonicalize(previous);
    let curr_canon = canonicalize(current);
    if prev_canon == curr_canon {
        return DeltaOutcome::Unchanged {
            current_hash: sha256_hex(&curr_canon),
        };
    }

    let mut ops = Vec::new();
    let mut path = Vec::new();
    diff(previous, current, &mut path, &mut ops);

    let envelope = json!({"encoding": ENCODING, "ops": ops});
    let full_json = serde_json::to_string(current).unwrap_or_default();
    let patch_json = serde_json::to_string(&envelope).unwrap_or_default();

    let full_bytes = full_json.len();
    let patch_bytes = patch_json.len();
    let savings_ratio = if full_bytes > 0 {
        full_bytes.saturating_sub(patch_bytes) as f64 / full_bytes as f64
    } else {
        0.0
    };
    let patch_ratio = if full_bytes > 0 {
        patch_bytes as f64 / full_bytes as f64
    } else {
        1.0
    };

    let reject = patch_bytes > cfg.max_patch_bytes
        || savings_ratio < cfg.min_savings_ratio
        || patch_ratio > cfg.max_patch_ratio
        || estimate_tokens(&patch_json) >= estimate_tokens(&full_json);

    if reject {
        return DeltaOutcome::Full { payload: current.clone() };
    }

    if counters.record_and_check(key, cfg.snapshot_interval) {
        return DeltaOutcome::Full { payload: current.clone() };
    }

    DeltaOutcome::Patch { envelope }
}

/// Applies a `lapc-delta-v1` envelope's ops to `previous`, reproducing the
/// value [`create_delta`] diffed against. Used by tests and available for a
/// client-side reference implementation.
pub fn apply_delta(previous: &Value, envelope: &Value) -> Value {
    let mut result = previous.clone();
    let ops = envelope.get("ops").and_then(Value::as_array).cloned().unwrap_or_default();
    for op in ops {
        let path: Vec<Value> = op.get("path").and_then(Value::as_array).cloned().unwrap_or_default();
        match op.get("op").and_then(Value::as_str) {
            Some("set") => set_path(&mut result, &path, op.get("value").cloned().unwrap_or(Value::Null)),
            Some("delete") => delete_path(&mut result, &path),
            _ => {}
        }
    }
    result
}

fn set_path(root: &mut Value, path: &[Value], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *root = value;
        return;
    };
    match head {
        Value::String(key) => {
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }
            let entry = root
                .as_object_mut()
                .expect("just ensured object")
                .entry(key.clone())
                .or_insert(Value::Null);
            set_path(entry, rest, value);
        }
        Value::Number(n) => {
            let index = n.as_u64().unwrap_or(0) as usize;
            if !root.is_array() {
                *root = Value::Array(Vec::new());
            }
            let arr = root.as_array_mut().expect("just ensured array");
            while arr.len() <= index {
                arr.push(Value::Null);
            }
            set_path(&mut arr[index], rest, value);
        }
        _ => {}
    }
}

fn delete_path(root: &mut Value, path: &[Value]) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        match head {
            Value::String(key) => {
                if let Some(map) = root.as_object_mut() {
                    map.remove(key);
                }
            }
            Value::Number(n) => {
                let index = n.as_u64().unwrap_or(0) as usize;
                if let Some(arr) = root.as_array_mut() {
                    if index < arr.len() {
                        arr.remove(index);
                    }
                }
            }
            _ => {}
        }
        return;
    }
    match head {
        Value::String(key) => {
            if let Some(child) = root.as_object_mut().and_then(|m| m.get_mut(key)) {
                delete_path(child, rest);
            }
        }
        Value::Number(n) => {
            let index = n.as_u64().unwrap_or(0) as usize;
            if let Some(child) = root.as_array_mut().and_then(|a| a.get_mut(index)) {
                delete_path(child, rest);
            }
        }
        _ => {}
    }
}
