use std::{fmt, str::FromStr, sync::Arc};

use serde_json::Value;
use shared::{
    domain::{ControlKey, PrinterFlags, TemplateKey},
    error::ApiError,
    protocol::ServerEvent,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    dispatch::{control_scope, CommandDispatcher, ConfirmationGate, DispatchOutcome},
    error::{PanelError, PanelResult},
    feedback::FeedbackRegistry,
    normalize::NormalizedControl,
    render::{collect_contributions, ControlContributor, RenderDriver},
    transport::PrinterTransport,
    tree::ControlNode,
};

const DEFAULT_EVENT_BUFFER: usize = 256;

/// Position of a control in the rendered tree: top-level index, then child indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlPath(pub Vec<usize>);

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl FromStr for ControlPath {
    type Err = PanelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let indices = raw
            .split('.')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PanelError::InvalidControlPath(raw.to_string()))?;
        if indices.is_empty() {
            return Err(PanelError::InvalidControlPath(raw.to_string()));
        }
        Ok(Self(indices))
    }
}

#[derive(Debug, Clone)]
pub enum PanelEvent {
    ControlsRendered { count: usize },
    OutputsUpdated { key: ControlKey, written: usize },
    StateChanged(PrinterFlags),
    ServerError(ApiError),
}

struct PanelState {
    driver: RenderDriver,
    registry: FeedbackRegistry,
    flags: PrinterFlags,
    logged_in: bool,
}

/// Owns the rendered control tree and the feedback registry.
///
/// All tree and registry mutation goes through `inner`; the lock is released
/// before a confirmation gate is awaited, so telemetry keeps flowing while a
/// dialog is open.
pub struct ControlPanel {
    transport: Arc<dyn PrinterTransport>,
    dispatcher: CommandDispatcher,
    inner: Mutex<PanelState>,
    events: broadcast::Sender<PanelEvent>,
}

impl ControlPanel {
    pub fn new(
        transport: Arc<dyn PrinterTransport>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Arc<Self> {
        Self::with_event_buffer(transport, gate, DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(
        transport: Arc<dyn PrinterTransport>,
        gate: Arc<dyn ConfirmationGate>,
        capacity: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            dispatcher: CommandDispatcher::new(Arc::clone(&transport), gate),
            transport,
            inner: Mutex::new(PanelState {
                driver: RenderDriver::new(),
                registry: FeedbackRegistry::new(),
                flags: PrinterFlags::default(),
                logged_in: false,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    /// Fetches the server's control document and re-renders.
    pub async fn request_controls(&self) -> PanelResult<usize> {
        let controls = self.transport.fetch_controls().await?;
        Ok(self.apply_controls_document(controls).await)
    }

    pub async fn apply_controls_document(&self, controls: Vec<ControlNode>) -> usize {
        let count = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.driver.set_server_controls(controls);
            state.driver.render(&mut state.registry).len()
        };
        info!(count, "server controls applied");
        let _ = self.events.send(PanelEvent::ControlsRendered { count });
        count
    }

    /// Collects contributed controls once, after every contributor is registered.
    /// Nothing is re-rendered when the contributors add no controls.
    pub async fn register_contributors(
        &self,
        contributors: &[Arc<dyn ControlContributor>],
    ) -> PanelResult<usize> {
        let lists = collect_contributions(contributors);
        let contributed: usize = lists.iter().map(Vec::len).sum();

        let count = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.driver.set_contributed_controls(lists)?;
            if contributed == 0 {
                return Ok(0);
            }
            state.driver.render(&mut state.registry).len()
        };
        info!(contributed, count, "contributed controls merged");
        let _ = self.events.send(PanelEvent::ControlsRendered { count });
        Ok(contributed)
    }

    pub async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Current { state } | ServerEvent::History { state } => {
                let changed = {
                    let mut guard = self.inner.lock().await;
                    let changed = guard.flags != state.flags;
                    guard.flags = state.flags;
                    changed
                };
                if changed {
                    let _ = self.events.send(PanelEvent::StateChanged(state.flags));
                }
            }
            ServerEvent::RegisteredMessageReceived(telemetry) => {
                let written = self.inner.lock().await.registry.deliver(&telemetry);
                if written == 0 {
                    debug!(key = %telemetry.key, "telemetry without a visual sink");
                    return;
                }
                let _ = self.events.send(PanelEvent::OutputsUpdated {
                    key: telemetry.key,
                    written,
                });
            }
            ServerEvent::Error(err) => {
                warn!(code = ?err.code, message = %err.message, "server reported error");
                let _ = self.events.send(PanelEvent::ServerError(err));
            }
        }
    }

    pub async fn set_logged_in(&self, logged_in: bool) {
        self.inner.lock().await.logged_in = logged_in;
    }

    pub async fn printer_flags(&self) -> PrinterFlags {
        self.inner.lock().await.flags
    }

    pub async fn controls(&self) -> Vec<Arc<NormalizedControl>> {
        self.inner.lock().await.driver.rendered().to_vec()
    }

    pub async fn output(&self, key: &ControlKey, template_key: &TemplateKey) -> Option<Value> {
        self.inner
            .lock()
            .await
            .registry
            .output(key, template_key)
            .map(|slot| slot.get())
    }

    pub async fn control_at(&self, path: &ControlPath) -> PanelResult<Arc<NormalizedControl>> {
        let guard = self.inner.lock().await;
        let mut indices = path.0.iter();
        let first = indices
            .next()
            .and_then(|index| guard.driver.rendered().get(*index))
            .ok_or_else(|| PanelError::UnknownControl(path.clone()))?;

        let mut current = Arc::clone(first);
        for index in indices {
            let next = current
                .child(*index)
                .cloned()
                .ok_or_else(|| PanelError::UnknownControl(path.clone()))?;
            current = next;
        }
        Ok(current)
    }

    pub async fn set_input(
        &self,
        path: &ControlPath,
        parameter: &str,
        value: Value,
    ) -> PanelResult<()> {
        let control = self.control_at(path).await?;
        let input = control
            .input(parameter)
            .ok_or_else(|| PanelError::UnknownInput {
                path: path.clone(),
                parameter: parameter.to_string(),
            })?;
        input.value.set(value);
        Ok(())
    }

    pub async fn is_enabled(&self, path: &ControlPath) -> PanelResult<bool> {
        let (control, scope) = self.control_with_scope(path).await?;
        CommandDispatcher::is_enabled(&control, &scope)
    }

    pub async fn click(&self, path: &ControlPath) -> PanelResult<DispatchOutcome> {
        let (control, scope) = self.control_with_scope(path).await?;
        let outcome = self.dispatcher.click(&control, &scope).await?;
        debug!(%path, ?outcome, "custom control clicked");
        Ok(outcome)
    }

    async fn control_with_scope(
        &self,
        path: &ControlPath,
    ) -> PanelResult<(Arc<NormalizedControl>, Value)> {
        let control = self.control_at(path).await?;
        let (flags, logged_in) = {
            let guard = self.inner.lock().await;
            (guard.flags, guard.logged_in)
        };
        let scope = control_scope(&control, &flags, logged_in);
        Ok((control, scope))
    }
}

#[cfg(test)]
#[path = "tests/panel_tests.rs"]
mod tests;
