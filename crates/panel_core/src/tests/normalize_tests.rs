use std::sync::Arc;

use serde_json::{json, Value};
use shared::domain::{ControlKey, Layout, TemplateKey};

use super::*;
use crate::{binding::Behavior, expr::ExprError, tree::ControlsDocument};

fn node(value: Value) -> ControlNode {
    serde_json::from_value(value).expect("control node")
}

#[test]
fn registers_output_slot_with_empty_initial_value() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({"name": "Temp", "key": "temps", "template": "T: {t0}", "template_key": "t0"}))
            .into(),
        &mut registry,
    );

    let slot = registry
        .output(&ControlKey::from("temps"), &TemplateKey::from("t0"))
        .expect("registered slot");
    assert!(slot.same_slot(control.output.as_ref().expect("output")));
    assert_eq!(slot.get(), json!(""));
}

#[test]
fn renormalizing_a_normalized_control_is_a_no_op() {
    let mut registry = FeedbackRegistry::new();
    let first = normalize(
        node(json!({
            "key": "temps",
            "template_key": "t0",
            "javascript": r#"command("M105")"#,
            "enabled": "user",
        }))
        .into(),
        &mut registry,
    );
    assert_eq!(registry.len(), 1);

    let again = normalize(ControlEntry::Normalized(Arc::clone(&first)), &mut registry);

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(registry.len(), 1);
    assert!(first
        .action
        .as_ref()
        .expect("action")
        .same_binding(again.action.as_ref().expect("action")));
    let registered = registry
        .output(&ControlKey::from("temps"), &TemplateKey::from("t0"))
        .expect("slot");
    assert!(registered.same_slot(first.output.as_ref().expect("output")));
}

#[test]
fn native_callables_survive_normalization() {
    let mut registry = FeedbackRegistry::new();
    let behavior = Behavior::native(|_ctx| Ok(Value::Bool(false)));
    let Behavior::Native(original) = behavior.clone() else {
        panic!("expected native behavior");
    };
    let control = normalize(
        ControlNode::command("Home", "G28")
            .with_enabled(behavior)
            .into(),
        &mut registry,
    );
    assert!(control
        .enabled
        .as_ref()
        .expect("enabled")
        .same_binding(&original));
}

#[test]
fn invalid_layout_on_container_defaults_to_vertical() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({
            "name": "Outer",
            "layout": "horizontal",
            "children": [
                {"name": "Inner", "layout": "diagonal", "children": [{"name": "Leaf", "command": "M105"}]},
                {"name": "Odd", "layout": 7, "children": []},
            ]
        }))
        .into(),
        &mut registry,
    );

    assert_eq!(control.layout, Some(Layout::Horizontal));
    let inner = control.child(0).expect("inner");
    assert_eq!(inner.layout, Some(Layout::Vertical));
    assert_eq!(control.child(1).expect("odd").layout, Some(Layout::Vertical));
    let leaf = inner.child(0).expect("leaf");
    assert_eq!(leaf.layout, None);
    assert_eq!(leaf.display_mode(), DisplayMode::Control);
    assert_eq!(inner.display_mode(), DisplayMode::Container);
}

#[test]
fn leaf_without_layout_is_left_alone() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(node(json!({"name": "Leaf", "layout": "diagonal"})).into(), &mut registry);
    assert_eq!(control.layout, None);
    assert!(!control.is_container());
}

#[test]
fn inputs_are_seeded_from_defaults() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({
            "name": "Fan",
            "command": "M106 S%(speed)s",
            "input": [
                {"name": "Speed", "parameter": "speed", "default": 5},
                {"name": "Ramp", "parameter": "ramp", "slider": {"min": 0, "max": 255}},
                {"name": "Flag", "parameter": "flag", "default": true, "slider": true},
            ]
        }))
        .into(),
        &mut registry,
    );

    let speed = control.input("speed").expect("speed");
    assert_eq!(speed.value.get(), json!(5));
    assert_eq!(speed.slider, SliderSpec::Toggle(false));
    assert!(!speed.slider.is_enabled());

    let ramp = control.input("ramp").expect("ramp");
    assert_eq!(ramp.value.get(), Value::Null);
    assert!(ramp.slider.is_enabled());
    assert_eq!(
        ramp.slider,
        SliderSpec::Range {
            min: Some(0.0),
            max: Some(255.0),
            step: None
        }
    );

    assert!(control.input("flag").expect("flag").slider.is_enabled());
}

#[test]
fn nodes_without_both_keys_never_register() {
    let mut registry = FeedbackRegistry::new();
    normalize_all(
        vec![
            node(json!({"name": "A", "key": "only-key"})).into(),
            node(json!({"name": "B", "template_key": "only-template"})).into(),
        ],
        &mut registry,
    );
    assert!(registry.is_empty());
}

#[test]
fn container_with_inputs_is_processed_on_both_paths() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({
            "name": "Both",
            "children": [{"name": "Child", "key": "k", "template_key": "t"}],
            "input": [{"parameter": "x", "default": 1}]
        }))
        .into(),
        &mut registry,
    );
    assert_eq!(control.layout, Some(Layout::Vertical));
    assert_eq!(control.input("x").expect("x").value.get(), json!(1));
    assert_eq!(registry.len(), 1);
}

#[test]
fn accepts_descriptive_field_aliases() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({
            "identity": "temps",
            "templateKey": "t0",
            "inputs": [{"parameterName": "x", "defaultValue": 5, "sliderEnabled": true}],
            "action": "send()",
            "confirmMessage": "Sure?",
            "widthSpan": 4,
            "offsetSpan": 1
        }))
        .into(),
        &mut registry,
    );

    assert_eq!(control.key, Some(ControlKey::from("temps")));
    assert_eq!(control.confirm.as_deref(), Some("Sure?"));
    assert!(control.action.is_some());
    assert_eq!(control.input("x").expect("x").value.get(), json!(5));
    assert_eq!(control.row_css(), "span4 offset1");
    assert_eq!(registry.len(), 1);
}

#[test]
fn row_css_defaults_to_span_two() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(ControlNode::command("Home", "G28").into(), &mut registry);
    assert_eq!(control.row_css(), "span2");
}

#[test]
fn view_reflects_current_slot_values() {
    let mut registry = FeedbackRegistry::new();
    let control = normalize(
        node(json!({
            "name": "Fan",
            "key": "fan",
            "template_key": "speed",
            "input": [{"parameter": "x", "default": 5}]
        }))
        .into(),
        &mut registry,
    );
    control.input("x").expect("x").value.set(json!(9));
    control.output.as_ref().expect("output").set(json!("75%"));

    let view = serde_json::to_value(control.view()).expect("json");
    assert_eq!(view["output"], json!("75%"));
    assert_eq!(view["inputs"][0]["value"], json!(9));
    assert_eq!(view["display_mode"], json!("control"));
}

#[test]
fn parses_server_document() {
    let document: ControlsDocument = serde_json::from_value(json!({
        "controls": [
            {"name": "Motors off", "command": "M18", "confirm": "Really?"},
            {"name": "Group", "children": []}
        ]
    }))
    .expect("document");
    assert_eq!(document.controls.len(), 2);
    assert_eq!(document.controls[0].confirm.as_deref(), Some("Really?"));
}

#[test]
fn malformed_fields_drop_alone_instead_of_the_document() {
    let document: ControlsDocument = serde_json::from_value(json!({
        "controls": [
            {"name": "Fan", "command": "M106"},
            {"name": "Wide", "command": "M107", "width": "6"},
            {"name": "Odd", "enabled": true, "commands": ["G28", 7], "inputs": [7, {"name": "ok"}]},
            "not a control"
        ]
    }))
    .expect("document");
    assert_eq!(document.controls.len(), 3);

    let controls = normalize_all(
        document.controls.into_iter().map(ControlEntry::from).collect(),
        &mut FeedbackRegistry::new(),
    );
    assert_eq!(controls[0].row_css(), "span2");
    assert_eq!(controls[1].name.as_deref(), Some("Wide"));
    assert_eq!(controls[1].row_css(), "span2");
    assert!(controls[2].enabled.is_none());
    assert_eq!(controls[2].commands.as_deref(), Some(&["G28".to_string()][..]));
    assert_eq!(controls[2].inputs.as_ref().expect("inputs").len(), 1);
}

#[test]
fn pathological_enabled_source_fails_only_when_evaluated() {
    let control = normalize(
        node(json!({"name": "Deep", "command": "M105", "enabled": format!("{}true", "!".repeat(20_000))}))
            .into(),
        &mut FeedbackRegistry::new(),
    );

    let err = control
        .enabled
        .as_ref()
        .expect("enabled")
        .evaluate_predicate(&json!({"state": {}, "user": true}))
        .expect_err("oversized source");
    assert!(matches!(err, ExprError::TooLong { .. }));
}
