use shared::error::ApiException;
use thiserror::Error;

use crate::{expr::ExprError, panel::ControlPath};

pub type PanelResult<T> = Result<T, PanelError>;

#[derive(Debug, Error)]
pub enum PanelError {
    /// A bound `enabled`/`javascript` expression failed; surfaced to the caller on purpose.
    #[error("custom control expression failed: {0}")]
    Expression(#[from] ExprError),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("printer api rejected request: {0}")]
    Api(#[from] ApiException),
    #[error("invalid server url '{url}': {source}")]
    InvalidServerUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("contributed controls were already registered for this session")]
    ContributionsSealed,
    #[error("no control at path {0}")]
    UnknownControl(ControlPath),
    #[error("control at path {path} has no input for parameter '{parameter}'")]
    UnknownInput { path: ControlPath, parameter: String },
    #[error("invalid control path '{0}'")]
    InvalidControlPath(String),
    #[error("failed to read settings file '{path}': {source}")]
    SettingsIo {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid settings file '{path}': {source}")]
    SettingsFormat {
        path: String,
        source: toml::de::Error,
    },
}
