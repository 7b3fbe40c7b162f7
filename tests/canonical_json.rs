use serde_json::json;
use ultra_lean_mcp_proxy::json::{canonicalize, estimate_tokens, parse_tools_hash, tools_hash};

#[test]
fn canonical_form_ignores_object_key_order_but_not_array_order() {
    let a = json!({"b": 1, "a": {"y": 2, "x": 1}});
    let b = json!({"a": {"x": 1, "y": 2}, "b": 1});
    assert_eq!(canonicalize(&a), canonicalize(&b));

    let arr_a = json!([1, 2, 3]);
    let arr_b = json!([3, 2, 1]);
    assert_ne!(canonicalize(&arr_a), canonicalize(&arr_b));
}

#[test]
fn tools_hash_round_trips_through_parse_tools_hash() {
    let hash = tools_hash(&json!({"tools": [{"name": "a"}]}));
    let hex = hash.strip_prefix("sha256:").unwrap();
    assert_eq!(parse_tools_hash(&hash), Some(hex));
}

#[test]
fn estimate_tokens_never_reports_zero_for_nonempty_bounds() {
    assert_eq!(estimate_tokens(""), 1);
    assert!(estimate_tokens(&"x".repeat(4000)) > 900);
}
