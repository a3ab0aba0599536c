//! Merge/Render Driver: combines the server-declared tree with controls
//! contributed by other modules and republishes the normalized result.

use std::{mem, sync::Arc};

use tracing::debug;

use crate::{
    error::{PanelError, PanelResult},
    feedback::FeedbackRegistry,
    normalize::{normalize_all, ControlEntry, NormalizedControl},
    tree::ControlNode,
};

/// Implemented by any module that wants to add controls to the panel.
pub trait ControlContributor: Send + Sync {
    fn additional_controls(&self) -> Vec<ControlNode>;
}

/// Asks every contributor once, preserving contributor order.
pub fn collect_contributions(contributors: &[Arc<dyn ControlContributor>]) -> Vec<Vec<ControlNode>> {
    contributors
        .iter()
        .map(|contributor| contributor.additional_controls())
        .collect()
}

#[derive(Debug, Default)]
pub struct RenderDriver {
    server: Vec<ControlEntry>,
    contributed: Vec<ControlEntry>,
    contributions_sealed: bool,
    rendered: Vec<Arc<NormalizedControl>>,
}

impl RenderDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_server_controls(&mut self, controls: Vec<ControlNode>) {
        self.server = controls.into_iter().map(ControlEntry::from).collect();
    }

    /// Contributions are fixed for the session; only the first call is accepted.
    pub fn set_contributed_controls(&mut self, lists: Vec<Vec<ControlNode>>) -> PanelResult<()> {
        if self.contributions_sealed {
            return Err(PanelError::ContributionsSealed);
        }
        self.contributions_sealed = true;
        self.contributed = lists
            .into_iter()
            .flatten()
            .map(ControlEntry::from)
            .collect();
        Ok(())
    }

    pub fn contributions_sealed(&self) -> bool {
        self.contributions_sealed
    }

    /// Server controls first, then contributed ones. Normalized results are
    /// written back so the next render skips them.
    pub fn render(&mut self, registry: &mut FeedbackRegistry) -> Vec<Arc<NormalizedControl>> {
        let server = normalize_all(mem::take(&mut self.server), registry);
        let contributed = normalize_all(mem::take(&mut self.contributed), registry);

        self.server = server.iter().cloned().map(ControlEntry::from).collect();
        self.contributed = contributed.iter().cloned().map(ControlEntry::from).collect();

        let mut rendered = server;
        rendered.extend(contributed);
        debug!(
            controls = rendered.len(),
            feedback_outputs = registry.len(),
            "control tree rendered"
        );
        self.rendered = rendered.clone();
        rendered
    }

    pub fn rendered(&self) -> &[Arc<NormalizedControl>] {
        &self.rendered
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
