//! Command Dispatcher: turns a clicked control into transport calls,
//! optionally behind a user confirmation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{
    domain::PrinterFlags,
    protocol::{CommandPayload, CustomCommandRequest},
};
use tracing::{debug, info, warn};

use crate::{
    error::PanelResult,
    expr::Effect,
    normalize::NormalizedControl,
    transport::PrinterTransport,
};

/// Interposed before any control that declares a `confirm` message.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

pub struct AutoConfirm;

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }
}

pub struct DeclineAll;

#[async_trait]
impl ConfirmationGate for DeclineAll {
    async fn confirm(&self, _message: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A transport call was made. Its result is not reported back.
    Sent,
    /// A bound action ran; `effects` transport or slot operations were executed.
    ActionCompleted { effects: usize },
    Declined,
    /// The control carries neither a command, commands nor a script.
    NoCommand,
}

/// Resolution order: `command`, then `commands`, then `script` (+ `context`).
/// Inputs contribute `parameters`, skipping any without a parameter name.
pub fn build_custom_command(control: &NormalizedControl) -> Option<CustomCommandRequest> {
    let payload = if let Some(command) = &control.command {
        CommandPayload::Single {
            command: command.clone(),
        }
    } else if let Some(commands) = &control.commands {
        CommandPayload::Multi {
            commands: commands.clone(),
        }
    } else if let Some(script) = &control.script {
        CommandPayload::Script {
            script: script.clone(),
            context: control.context.clone(),
        }
    } else {
        return None;
    };

    Some(CustomCommandRequest {
        payload,
        parameters: control_parameters(control),
    })
}

fn control_parameters(control: &NormalizedControl) -> Option<Map<String, Value>> {
    let inputs = control.inputs.as_ref()?;
    let mut parameters = Map::new();
    for input in inputs {
        let Some(parameter) = &input.parameter else {
            continue;
        };
        parameters.insert(parameter.clone(), input.value.get());
    }
    Some(parameters)
}

/// Data context handed to `enabled` and `javascript` expressions.
pub fn control_scope(control: &NormalizedControl, flags: &PrinterFlags, is_user: bool) -> Value {
    let mut inputs = Map::new();
    for input in control.inputs.iter().flatten() {
        if let Some(label) = input.parameter.as_ref().or(input.name.as_ref()) {
            inputs.insert(label.clone(), input.value.get());
        }
    }

    json!({
        "data": {
            "name": control.name,
            "key": control.key,
            "template_key": control.template_key,
            "output": control.output.as_ref().map(|slot| slot.get()),
            "inputs": inputs,
            "command": control.command,
            "commands": control.commands,
            "script": control.script,
        },
        "state": flags,
        "user": is_user,
    })
}

pub struct CommandDispatcher {
    transport: Arc<dyn PrinterTransport>,
    gate: Arc<dyn ConfirmationGate>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn PrinterTransport>, gate: Arc<dyn ConfirmationGate>) -> Self {
        Self { transport, gate }
    }

    /// A bound `enabled` predicate wins; otherwise the printer must be
    /// operational and the viewer logged in.
    pub fn is_enabled(control: &NormalizedControl, scope: &Value) -> PanelResult<bool> {
        match &control.enabled {
            Some(predicate) => Ok(predicate.evaluate_predicate(scope)?),
            None => Ok(scope["state"]["operational"].as_bool().unwrap_or(false)
                && scope["user"].as_bool().unwrap_or(false)),
        }
    }

    /// Sends the control's own command payload, behind its confirmation gate.
    pub async fn dispatch(&self, control: &NormalizedControl) -> DispatchOutcome {
        let Some(request) = build_custom_command(control) else {
            return DispatchOutcome::NoCommand;
        };
        if !self.confirmed(control).await {
            return DispatchOutcome::Declined;
        }
        self.send(&request).await;
        DispatchOutcome::Sent
    }

    /// Runs the bound action if there is one, else dispatches the control's
    /// command. Both paths sit behind the confirmation gate. Expression
    /// failures propagate to the caller.
    pub async fn click(
        &self,
        control: &NormalizedControl,
        scope: &Value,
    ) -> PanelResult<DispatchOutcome> {
        let Some(action) = &control.action else {
            return Ok(self.dispatch(control).await);
        };

        if !self.confirmed(control).await {
            return Ok(DispatchOutcome::Declined);
        }

        let effects = action.evaluate_action(scope)?;
        let executed = self.run_effects(control, effects).await;
        Ok(DispatchOutcome::ActionCompleted { effects: executed })
    }

    async fn confirmed(&self, control: &NormalizedControl) -> bool {
        let Some(message) = &control.confirm else {
            return true;
        };
        let acknowledged = self.gate.confirm(message).await;
        if !acknowledged {
            debug!(control = ?control.name, "custom control declined at confirmation");
        }
        acknowledged
    }

    async fn run_effects(&self, control: &NormalizedControl, effects: Vec<Effect>) -> usize {
        let mut executed = 0;
        for effect in effects {
            match effect {
                Effect::Command(command) => {
                    let request = CustomCommandRequest {
                        payload: CommandPayload::Single { command },
                        parameters: control_parameters(control),
                    };
                    self.send(&request).await;
                }
                Effect::Commands(commands) => {
                    let request = CustomCommandRequest {
                        payload: CommandPayload::Multi { commands },
                        parameters: control_parameters(control),
                    };
                    self.send(&request).await;
                }
                Effect::Script { name, context } => {
                    let request = CustomCommandRequest {
                        payload: CommandPayload::Script {
                            script: name,
                            context,
                        },
                        parameters: control_parameters(control),
                    };
                    self.send(&request).await;
                }
                Effect::SetInput { parameter, value } => match control.input(&parameter) {
                    Some(input) => input.value.set(value),
                    None => {
                        warn!(%parameter, control = ?control.name, "action set unknown input");
                        continue;
                    }
                },
                Effect::Send => match build_custom_command(control) {
                    Some(request) => self.send(&request).await,
                    None => continue,
                },
                Effect::Log(value) => {
                    info!(control = ?control.name, %value, "custom control log");
                }
            }
            executed += 1;
        }
        executed
    }

    // Failures are logged only; the control tree never sees them.
    async fn send(&self, request: &CustomCommandRequest) {
        if let Err(err) = self.transport.send_custom_command(request).await {
            warn!(error = %err, "custom command dispatch failed");
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
