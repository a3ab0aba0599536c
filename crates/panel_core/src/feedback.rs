use std::collections::HashMap;

use shared::{
    domain::{ControlKey, TemplateKey},
    protocol::TelemetryEvent,
};
use tracing::debug;

use crate::slot::Slot;

/// Maps control identity -> template key -> output slot.
///
/// Entries are only ever added or replaced. A second registration of the same
/// pair replaces the earlier slot (last writer wins).
#[derive(Debug, Default)]
pub struct FeedbackRegistry {
    outputs: HashMap<ControlKey, HashMap<TemplateKey, Slot>>,
}

impl FeedbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: ControlKey, template_key: TemplateKey, slot: Slot) -> Option<Slot> {
        let outputs = self.outputs.entry(key.clone()).or_default();
        let previous = outputs.insert(template_key.clone(), slot);
        if previous.is_some() {
            debug!(%key, %template_key, "feedback slot rebound");
        }
        previous
    }

    /// Writes every output present both in the event and the registry.
    /// Returns how many slots were written; unknown identities are dropped.
    pub fn deliver(&self, event: &TelemetryEvent) -> usize {
        let Some(outputs) = self.outputs.get(&event.key) else {
            return 0;
        };

        let mut written = 0;
        for (template_key, value) in &event.outputs {
            if let Some(slot) = outputs.get(template_key) {
                slot.set(value.clone());
                written += 1;
            }
        }
        written
    }

    pub fn output(&self, key: &ControlKey, template_key: &TemplateKey) -> Option<&Slot> {
        self.outputs.get(key)?.get(template_key)
    }

    /// Number of registered identity/template pairs.
    pub fn len(&self) -> usize {
        self.outputs.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "tests/feedback_tests.rs"]
mod tests;
