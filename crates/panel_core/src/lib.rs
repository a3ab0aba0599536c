//! Control panel core for a 3D-printer web client.
//!
//! Mirrors printer state pushed by the server and drives the custom control
//! tree: documents are normalized into render-ready controls, feedback
//! outputs are bound to telemetry by control key, and clicks are turned into
//! printer commands.

pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod feedback;
pub mod jog;
pub mod normalize;
pub mod panel;
pub mod render;
pub mod slot;
pub mod transport;
pub mod tree;

pub use binding::{bind, Behavior, Binding};
pub use config::{load_settings, load_settings_from, Settings};
pub use dispatch::{
    build_custom_command, AutoConfirm, CommandDispatcher, ConfirmationGate, DeclineAll,
    DispatchOutcome,
};
pub use error::{PanelError, PanelResult};
pub use feedback::FeedbackRegistry;
pub use jog::JogController;
pub use normalize::{normalize, normalize_all, ControlEntry, ControlView, NormalizedControl};
pub use panel::{ControlPanel, ControlPath, PanelEvent};
pub use render::{ControlContributor, RenderDriver};
pub use slot::Slot;
pub use transport::{HttpTransport, PrinterTransport};
pub use tree::{ControlNode, ControlsDocument, InputField, SliderSpec};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
