use taskflow::dsl::builder::FlowBuilder;
use taskflow::dsl::{Flow, Step};
use taskflow::FlowError;
use serde_json::json;

#[test]
fn test_build_flow() {
    let flow = FlowBuilder::new()
        .task("a")
        .group(["b", "c"])
        .task("d")
        .build();

    assert_eq!(flow.len(), 3);
    assert_eq!(flow.steps()[0], Step::Task("a".to_string()));
    assert!(flow.steps()[1].is_group());
    assert_eq!(flow.steps()[1].task_ids(1).expect("valid group"), ["b".to_string(), "c".to_string()]);
}

#[test]
fn test_flow_from_nested_data() {
    let flow = Flow::from_value(&json!(["a", ["b", "c"], "d"])).expect("valid flow");
    let expected = FlowBuilder::new().task("a").group(["b", "c"]).task("d").build();
    assert_eq!(flow, expected);
}

#[test]
fn test_single_member_group_is_still_a_group() {
    let flow = Flow::from_value(&json!([["solo"]])).expect("valid flow");
    assert_eq!(flow.steps()[0], Step::group(["solo"]));
}

#[test]
fn test_flow_serializes_as_nested_lists() {
    let flow = FlowBuilder::new().task("a").group(["b", "c"]).build();
    assert_eq!(serde_json::to_value(&flow).expect("serialize"), json!(["a", ["b", "c"]]));

    let back: Flow = serde_json::from_value(json!(["a", ["b", "c"]])).expect("deserialize");
    assert_eq!(back, flow);
}

#[test]
fn test_malformed_steps() {
    let cases = [
        (json!(["a", []]), 1),
        (json!([42]), 0),
        (json!(["a", "b", ["c", 7]]), 2),
        (json!(["a", {"task": "b"}]), 1),
        (json!(["   "]), 0),
        (json!([["x", ""]]), 0),
    ];

    for (value, position) in cases {
        match Flow::from_value(&value) {
            Err(FlowError::MalformedStep { index, .. }) => assert_eq!(index, position, "{}", value),
            other => panic!("{} should be malformed, got {:?}", value, other),
        }
    }
}

#[test]
fn test_flow_must_be_a_list() {
    assert!(matches!(Flow::from_value(&json!("a")), Err(FlowError::MalformedStep { .. })));
}

#[test]
fn test_empty_flow_is_valid() {
    let flow = Flow::from_value(&json!([])).expect("empty flow");
    assert!(flow.is_empty());
}

#[test]
fn test_deferred_step_keeps_bad_entry_in_place() {
    let good = Step::from_value_deferred(0, &json!(["a", "b"]));
    assert_eq!(good, Step::group(["a", "b"]));

    let bad = Step::from_value_deferred(1, &json!([]));
    match &bad {
        Step::Malformed { raw, reason } => {
            assert_eq!(raw, &json!([]));
            assert_eq!(reason, "parallel group is empty");
        }
        other => panic!("expected a malformed step, got {:?}", other),
    }
    assert!(!bad.is_group());
    match bad.task_ids(1) {
        Err(FlowError::MalformedStep { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected MalformedStep, got {:?}", other),
    }
}
