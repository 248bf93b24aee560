use ds_telemetry::{metrics, new_trace_id, record_attribute_fields, record_rule_failure};

#[test]
fn trace_id_non_empty() {
    let first = new_trace_id();
    let second = new_trace_id();
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_attribute_fields(3, 1);
    record_rule_failure();
    let after = metrics().snapshot();
    assert!(after.attribute_fields_written >= before.attribute_fields_written + 3);
    assert!(after.attribute_fields_failed >= before.attribute_fields_failed + 1);
    assert!(after.rule_failure >= before.rule_failure + 1);
}
