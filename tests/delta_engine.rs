use serde_json::json;
use ultra_lean_mcp_proxy::compress::{apply_delta, create_delta, DeltaCounters, DeltaOutcome};
use ultra_lean_mcp_proxy::config::DeltaResponsesConfig;

fn cfg() -> DeltaResponsesConfig {
    DeltaResponsesConfig {
        enabled: true,
        max_patch_bytes: 4096,
        min_savings_ratio: 0.0,
        max_patch_ratio: 1.0,
        snapshot_interval: 0,
    }
}

#[test]
fn applying_a_patch_reproduces_the_current_payload() {
    let previous = json!({
        "items": [{"id": 1, "status": "open"}, {"id": 2, "status": "open"}],
        "cursor": "a",
    });
    let current = json!({
        "items": [{"id": 1, "status": "closed"}, {"id": 2, "status": "open"}],
        "cursor": "b",
    });

    let mut counters = DeltaCounters::default();
    let DeltaOutcome::Patch { envelope } = create_delta(&previous, &current, "k1", &cfg(), &mut counters) else {
        panic!("expected a patch for a small, targeted change");
    };
    assert_eq!(envelope["encoding"], json!("lapc-delta-v1"));

    let rebuilt = apply_delta(&previous, &envelope);
    assert_eq!(rebuilt, current);
}

#[test]
fn identical_payloads_report_unchanged_with_a_stable_hash() {
    let value = json!({"a": [1, 2, 3]});
    let mut counters = DeltaCounters::default();
    let first = create_delta(&value, &value, "k2", &cfg(), &mut counters);
    let second = create_delta(&value, &value, "k2", &cfg(), &mut counters);
    let (DeltaOutcome::Unchanged { current_hash: h1 }, DeltaOutcome::Unchanged { current_hash: h2 }) =
        (first, second)
    else {
        panic!("expected both calls to report unchanged");
    };
    assert_eq!(h1, h2);
}
