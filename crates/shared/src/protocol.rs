use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{Axis, ControlKey, PrinterState, TemplateKey, ToolKey},
    error::ApiError,
};

/// Body of `POST /api/printer/command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommandRequest {
    #[serde(flatten)]
    pub payload: CommandPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

impl CustomCommandRequest {
    pub fn new(payload: CommandPayload) -> Self {
        Self {
            payload,
            parameters: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandPayload {
    Single {
        command: String,
    },
    Multi {
        commands: Vec<String>,
    },
    Script {
        script: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Map<String, Value>>,
    },
}

/// Body of `POST /api/printer/tool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ToolCommand {
    Extrude { amount: f64 },
    Select { tool: ToolKey },
    Flowrate { factor: u32 },
}

/// Body of `POST /api/printer/printhead`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PrintHeadCommand {
    Jog {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        z: Option<f64>,
    },
    Home {
        axes: Vec<Axis>,
    },
    Feedrate {
        factor: u32,
    },
}

impl PrintHeadCommand {
    pub fn jog(axis: Axis, distance: f64) -> Self {
        let (mut x, mut y, mut z) = (None, None, None);
        match axis {
            Axis::X => x = Some(distance),
            Axis::Y => y = Some(distance),
            Axis::Z => z = Some(distance),
        }
        Self::Jog { x, y, z }
    }
}

/// Output values pushed by the server for one feedback-producing control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(alias = "identity")]
    pub key: ControlKey,
    #[serde(default)]
    pub outputs: BTreeMap<TemplateKey, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Current { state: PrinterState },
    History { state: PrinterState },
    RegisteredMessageReceived(TelemetryEvent),
    Error(ApiError),
}
