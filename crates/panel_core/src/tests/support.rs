use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared::{
    error::{ApiException, ErrorCode},
    protocol::{CustomCommandRequest, PrintHeadCommand, ToolCommand},
};
use tokio::sync::{oneshot, Notify};

use crate::{
    dispatch::ConfirmationGate,
    error::{PanelError, PanelResult},
    transport::PrinterTransport,
    tree::ControlNode,
};

#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub controls: Mutex<Vec<ControlNode>>,
    pub custom: Mutex<Vec<CustomCommandRequest>>,
    pub tool: Mutex<Vec<ToolCommand>>,
    pub printhead: Mutex<Vec<PrintHeadCommand>>,
    pub fail_with: Option<ErrorCode>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_controls(controls: Vec<ControlNode>) -> Arc<Self> {
        let transport = Self::default();
        *transport.controls.lock().expect("controls") = controls;
        Arc::new(transport)
    }

    pub fn failing(code: ErrorCode) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(code),
            ..Self::default()
        })
    }

    pub fn custom_requests(&self) -> Vec<CustomCommandRequest> {
        self.custom.lock().expect("custom").clone()
    }

    fn result(&self) -> PanelResult<()> {
        match self.fail_with {
            Some(code) => Err(PanelError::Api(ApiException::new(code, "rejected"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PrinterTransport for RecordingTransport {
    async fn fetch_controls(&self) -> PanelResult<Vec<ControlNode>> {
        self.result()?;
        Ok(self.controls.lock().expect("controls").clone())
    }

    async fn send_custom_command(&self, request: &CustomCommandRequest) -> PanelResult<()> {
        self.custom.lock().expect("custom").push(request.clone());
        self.result()
    }

    async fn send_tool_command(&self, command: &ToolCommand) -> PanelResult<()> {
        self.tool.lock().expect("tool").push(command.clone());
        self.result()
    }

    async fn send_printhead_command(&self, command: &PrintHeadCommand) -> PanelResult<()> {
        self.printhead.lock().expect("printhead").push(command.clone());
        self.result()
    }
}

/// Answers every prompt with a fixed value and remembers what was asked.
pub(crate) struct ScriptedGate {
    answer: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGate {
    pub fn answering(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts").clone()
    }
}

#[async_trait]
impl ConfirmationGate for ScriptedGate {
    async fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().expect("prompts").push(message.to_string());
        self.answer
    }
}

/// Holds the prompt open until the test answers it.
pub(crate) struct HeldGate {
    pub shown: Notify,
    answer: tokio::sync::Mutex<Option<oneshot::Receiver<bool>>>,
}

impl HeldGate {
    pub fn new() -> (Arc<Self>, oneshot::Sender<bool>) {
        let (tx, rx) = oneshot::channel();
        let gate = Arc::new(Self {
            shown: Notify::new(),
            answer: tokio::sync::Mutex::new(Some(rx)),
        });
        (gate, tx)
    }
}

#[async_trait]
impl ConfirmationGate for HeldGate {
    async fn confirm(&self, _message: &str) -> bool {
        self.shown.notify_one();
        let Some(rx) = self.answer.lock().await.take() else {
            return false;
        };
        rx.await.unwrap_or(false)
    }
}
