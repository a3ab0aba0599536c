//! Fixed jog, homing and extrusion controls that sit beside the custom tree.

use std::sync::Arc;

use shared::{
    domain::{Axis, ToolKey},
    protocol::{PrintHeadCommand, ToolCommand},
};
use tracing::debug;

use crate::{config::Settings, error::PanelResult, transport::PrinterTransport};

pub struct JogController {
    transport: Arc<dyn PrinterTransport>,
    inverted_axes: Vec<Axis>,
    default_extrusion_length: f64,
}

impl JogController {
    pub fn new(transport: Arc<dyn PrinterTransport>, settings: &Settings) -> Self {
        Self {
            transport,
            inverted_axes: settings.inverted_axes.clone(),
            default_extrusion_length: settings.default_extrusion_length,
        }
    }

    /// Inverted axes in the printer profile flip the sign of the move.
    pub fn jog_command(&self, axis: Axis, multiplier: f64, distance: f64) -> PrintHeadCommand {
        let multiplier = if self.inverted_axes.contains(&axis) {
            -multiplier
        } else {
            multiplier
        };
        PrintHeadCommand::jog(axis, distance * multiplier)
    }

    /// A missing or zero amount falls back to the configured default length.
    pub fn extrusion_command(&self, direction: f64, amount: Option<f64>) -> ToolCommand {
        let length = amount
            .filter(|amount| *amount != 0.0)
            .unwrap_or(self.default_extrusion_length);
        ToolCommand::Extrude {
            amount: length * direction,
        }
    }

    pub async fn jog(&self, axis: Axis, multiplier: f64, distance: f64) -> PanelResult<()> {
        let command = self.jog_command(axis, multiplier, distance);
        debug!(?command, "sending jog command");
        self.transport.send_printhead_command(&command).await
    }

    pub async fn home(&self, axes: &[Axis]) -> PanelResult<()> {
        self.transport
            .send_printhead_command(&PrintHeadCommand::Home {
                axes: axes.to_vec(),
            })
            .await
    }

    pub async fn feed_rate(&self, factor: u32) -> PanelResult<()> {
        self.transport
            .send_printhead_command(&PrintHeadCommand::Feedrate { factor })
            .await
    }

    pub async fn extrude(&self, amount: Option<f64>) -> PanelResult<()> {
        self.transport
            .send_tool_command(&self.extrusion_command(1.0, amount))
            .await
    }

    pub async fn retract(&self, amount: Option<f64>) -> PanelResult<()> {
        self.transport
            .send_tool_command(&self.extrusion_command(-1.0, amount))
            .await
    }

    pub async fn flow_rate(&self, factor: u32) -> PanelResult<()> {
        self.transport
            .send_tool_command(&ToolCommand::Flowrate { factor })
            .await
    }

    /// Returns `false` without sending anything when the key is empty.
    pub async fn select_tool(&self, tool: &ToolKey) -> PanelResult<bool> {
        if tool.is_empty() {
            return Ok(false);
        }
        self.transport
            .send_tool_command(&ToolCommand::Select { tool: tool.clone() })
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/jog_tests.rs"]
mod tests;
