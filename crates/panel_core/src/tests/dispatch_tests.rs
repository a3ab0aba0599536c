use serde_json::json;
use shared::error::ErrorCode;

use super::*;
use crate::{
    error::PanelError,
    expr::ExprError,
    feedback::FeedbackRegistry,
    normalize::normalize,
    test_support::{RecordingTransport, ScriptedGate},
    tree::{ControlNode, InputField},
};

fn normalized(node: ControlNode) -> Arc<NormalizedControl> {
    normalize(node.into(), &mut FeedbackRegistry::new())
}

fn from_json(value: Value) -> Arc<NormalizedControl> {
    normalized(serde_json::from_value(value).expect("control node"))
}

fn operational() -> PrinterFlags {
    PrinterFlags {
        operational: true,
        ready: true,
        ..PrinterFlags::default()
    }
}

#[test]
fn command_wins_over_commands_and_script() {
    let control = from_json(json!({
        "command": "M105",
        "commands": ["G28", "M84"],
        "script": "afterPrint"
    }));
    let request = build_custom_command(&control).expect("request");
    assert_eq!(
        request.payload,
        CommandPayload::Single {
            command: "M105".into()
        }
    );
    assert_eq!(request.parameters, None);
}

#[test]
fn commands_win_over_script() {
    let control = from_json(json!({"commands": ["G28", "M84"], "script": "afterPrint"}));
    let request = build_custom_command(&control).expect("request");
    assert_eq!(
        request.payload,
        CommandPayload::Multi {
            commands: vec!["G28".into(), "M84".into()]
        }
    );
}

#[test]
fn script_carries_its_context() {
    let control = from_json(json!({"script": "heat", "context": {"target": 210}}));
    let request = build_custom_command(&control).expect("request");
    let body = serde_json::to_value(&request).expect("json");
    assert_eq!(body, json!({"script": "heat", "context": {"target": 210}}));
}

#[test]
fn control_without_payload_builds_nothing() {
    assert!(build_custom_command(&normalized(ControlNode::container("Group", vec![]))).is_none());
}

#[test]
fn parameters_follow_current_input_values() {
    let control = normalized(
        ControlNode::command("Move", "G1 X%(x)s").with_input(InputField::new("x", 5)),
    );
    let request = build_custom_command(&control).expect("request");
    assert_eq!(
        serde_json::to_value(&request).expect("json"),
        json!({"command": "G1 X%(x)s", "parameters": {"x": 5}})
    );

    control.input("x").expect("x").value.set(json!(9));
    let request = build_custom_command(&control).expect("request");
    assert_eq!(request.parameters.expect("parameters")["x"], json!(9));
}

#[test]
fn inputs_without_parameter_are_skipped() {
    let control = from_json(json!({
        "command": "M117 %(msg)s",
        "input": [{"name": "Label only", "default": "x"}, {"parameter": "msg", "default": "hi"}]
    }));
    let parameters = build_custom_command(&control)
        .expect("request")
        .parameters
        .expect("parameters");
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters["msg"], json!("hi"));
}

#[tokio::test]
async fn declined_confirmation_sends_nothing() {
    let transport = RecordingTransport::new();
    let gate = ScriptedGate::answering(false);
    let dispatcher = CommandDispatcher::new(transport.clone(), gate.clone());
    let control = normalized(ControlNode::command("Motors off", "M18").with_confirm("Really?"));

    let outcome = dispatcher.dispatch(&control).await;

    assert_eq!(outcome, DispatchOutcome::Declined);
    assert!(transport.custom_requests().is_empty());
    assert_eq!(gate.prompts(), ["Really?"]);
}

#[tokio::test]
async fn accepted_confirmation_sends_once() {
    let transport = RecordingTransport::new();
    let gate = ScriptedGate::answering(true);
    let dispatcher = CommandDispatcher::new(transport.clone(), gate.clone());
    let control = normalized(ControlNode::command("Motors off", "M18").with_confirm("Really?"));

    let outcome = dispatcher.dispatch(&control).await;

    assert_eq!(outcome, DispatchOutcome::Sent);
    assert_eq!(transport.custom_requests().len(), 1);
}

#[tokio::test]
async fn no_prompt_without_confirm_message() {
    let transport = RecordingTransport::new();
    let gate = ScriptedGate::answering(false);
    let dispatcher = CommandDispatcher::new(transport.clone(), gate.clone());

    let outcome = dispatcher
        .dispatch(&normalized(ControlNode::command("Temp", "M105")))
        .await;

    assert_eq!(outcome, DispatchOutcome::Sent);
    assert!(gate.prompts().is_empty());
}

#[tokio::test]
async fn nothing_to_send_skips_the_gate() {
    let transport = RecordingTransport::new();
    let gate = ScriptedGate::answering(true);
    let dispatcher = CommandDispatcher::new(transport.clone(), gate.clone());
    let control = normalized(ControlNode::container("Group", vec![]).with_confirm("Sure?"));

    assert_eq!(dispatcher.dispatch(&control).await, DispatchOutcome::NoCommand);
    assert!(gate.prompts().is_empty());
    assert!(transport.custom_requests().is_empty());
}

#[tokio::test]
async fn transport_failure_is_not_surfaced() {
    let transport = RecordingTransport::failing(ErrorCode::Conflict);
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));

    let outcome = dispatcher
        .dispatch(&normalized(ControlNode::command("Temp", "M105")))
        .await;

    assert_eq!(outcome, DispatchOutcome::Sent);
    assert_eq!(transport.custom_requests().len(), 1);
}

#[tokio::test]
async fn action_effects_run_in_order() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));
    let control = normalized(
        ControlNode::command("Preheat", "M104 S%(temp)s")
            .with_input(InputField::new("temp", 180))
            .with_action(r#"set("temp", data.inputs.temp + 20); command("M140 S60"); send(); log("done")"#),
    );
    let scope = control_scope(&control, &operational(), true);

    let outcome = dispatcher.click(&control, &scope).await.expect("click");

    assert_eq!(outcome, DispatchOutcome::ActionCompleted { effects: 4 });
    assert_eq!(control.input("temp").expect("temp").value.get(), json!(200));
    let requests = transport.custom_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].payload,
        CommandPayload::Single {
            command: "M140 S60".into()
        }
    );
    assert_eq!(
        requests[1].payload,
        CommandPayload::Single {
            command: "M104 S%(temp)s".into()
        }
    );
    assert_eq!(requests[1].parameters.as_ref().expect("parameters")["temp"], json!(200));
}

#[tokio::test]
async fn setting_unknown_input_is_not_counted() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));
    let control = normalized(ControlNode::command("X", "M105").with_action(r#"set("missing", 1)"#));
    let scope = control_scope(&control, &operational(), true);

    let outcome = dispatcher.click(&control, &scope).await.expect("click");

    assert_eq!(outcome, DispatchOutcome::ActionCompleted { effects: 0 });
    assert!(transport.custom_requests().is_empty());
}

#[tokio::test]
async fn set_reaches_inputs_keyed_by_display_name() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));
    let control = from_json(json!({
        "name": "Label",
        "command": "M117",
        "inputs": [{"name": "Label only", "default": "hi"}],
        "javascript": r#"set("Label only", data.inputs["Label only"] + "!")"#
    }));
    let scope = control_scope(&control, &operational(), true);

    let outcome = dispatcher.click(&control, &scope).await.expect("click");

    assert_eq!(outcome, DispatchOutcome::ActionCompleted { effects: 1 });
    assert_eq!(control.input("Label only").expect("input").value.get(), json!("hi!"));
}

#[tokio::test]
async fn malformed_action_fails_on_click() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));
    let control = normalized(ControlNode::command("Broken", "M105").with_action(r#"command("M105""#));
    let scope = control_scope(&control, &operational(), true);

    let err = dispatcher
        .click(&control, &scope)
        .await
        .expect_err("malformed action");

    assert!(matches!(err, PanelError::Expression(ExprError::Parse { .. })));
    assert!(transport.custom_requests().is_empty());
}

#[tokio::test]
async fn declined_action_is_not_evaluated() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(DeclineAll));
    let control = normalized(
        ControlNode::command("Off", "M18")
            .with_confirm("Sure?")
            .with_action(r#"command("M84")"#),
    );
    let scope = control_scope(&control, &operational(), true);

    let outcome = dispatcher.click(&control, &scope).await.expect("click");

    assert_eq!(outcome, DispatchOutcome::Declined);
    assert!(transport.custom_requests().is_empty());
}

#[tokio::test]
async fn click_without_action_dispatches_the_command() {
    let transport = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(transport.clone(), Arc::new(AutoConfirm));
    let control = normalized(ControlNode::command("Home", "G28"));
    let scope = control_scope(&control, &operational(), true);

    let outcome = dispatcher.click(&control, &scope).await.expect("click");

    assert_eq!(outcome, DispatchOutcome::Sent);
    assert_eq!(transport.custom_requests().len(), 1);
}

#[test]
fn default_enablement_requires_operational_printer_and_user() {
    let control = normalized(ControlNode::command("Home", "G28"));
    let idle = PrinterFlags::default();

    assert!(CommandDispatcher::is_enabled(&control, &control_scope(&control, &operational(), true))
        .expect("enabled"));
    assert!(!CommandDispatcher::is_enabled(&control, &control_scope(&control, &operational(), false))
        .expect("enabled"));
    assert!(!CommandDispatcher::is_enabled(&control, &control_scope(&control, &idle, true))
        .expect("enabled"));
}

#[test]
fn enabled_predicate_sees_state_and_data() {
    let control = normalized(
        ControlNode::command("Resume", "M24")
            .with_input(InputField::new("speed", 50))
            .with_enabled("state.paused && data.inputs.speed > 10"),
    );
    let paused = PrinterFlags {
        paused: true,
        ..PrinterFlags::default()
    };

    assert!(CommandDispatcher::is_enabled(&control, &control_scope(&control, &paused, false))
        .expect("enabled"));
    assert!(!CommandDispatcher::is_enabled(&control, &control_scope(&control, &operational(), true))
        .expect("enabled"));
}

#[test]
fn effects_in_enabled_predicate_are_rejected() {
    let control = normalized(ControlNode::command("Bad", "M105").with_enabled(r#"command("M112")"#));
    let err = CommandDispatcher::is_enabled(&control, &control_scope(&control, &operational(), true))
        .expect_err("predicate must not emit");
    assert!(matches!(
        err,
        PanelError::Expression(ExprError::EffectNotAllowed { .. })
    ));
}
