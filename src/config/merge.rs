use serde_json::Value;

/// Deep-merge per spec.md §9 DESIGN NOTES: scalar or non-object → replace,
/// object+object → key-wise recurse. `patch` wins on every leaf.
pub fn deep_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_patch_replaces() {
        assert_eq!(deep_merge(json!(1), json!(2)), json!(2));
    }

    #[test]
    fn object_patch_recurses_key_wise() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let patch = json!({"b": {"c": 99}});
        let merged = deep_merge(base, patch);
        assert_eq!(merged, json!({"a": 1, "b": {"c": 99, "d": 3}}));
    }

    #[test]
    fn non_object_patch_replaces_whole_object() {
        let base = json!({"a": {"nested": true}});
        let patch = json!({"a": "scalar-now"});
        assert_eq!(deep_merge(base, patch), json!({"a": "scalar-now"}));
    }
}
