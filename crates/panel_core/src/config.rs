use std::{fs, path::Path};

use serde::Deserialize;
use shared::domain::Axis;
use tracing::warn;

use crate::{
    error::{PanelError, PanelResult},
    transport::parse_base_url,
};

pub const DEFAULT_SETTINGS_FILE: &str = "panel.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub api_key: Option<String>,
    /// Used when an extrude/retract request carries no amount.
    pub default_extrusion_length: f64,
    pub inverted_axes: Vec<Axis>,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            api_key: None,
            default_extrusion_length: 5.0,
            inverted_axes: Vec::new(),
            event_buffer: 256,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> PanelResult<()> {
        parse_base_url(&self.server_url)?;
        Ok(())
    }

    pub fn is_inverted(&self, axis: Axis) -> bool {
        self.inverted_axes.contains(&axis)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    api_key: Option<String>,
    default_extrusion_length: Option<f64>,
    inverted_axes: Option<Vec<Axis>>,
    event_buffer: Option<usize>,
}

/// Defaults, then `panel.toml` in the working directory if present, then the environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if Path::new(DEFAULT_SETTINGS_FILE).exists() {
        match read_settings_file(Path::new(DEFAULT_SETTINGS_FILE)) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(error = %err, "ignoring unreadable settings file"),
        }
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings
}

/// Like [`load_settings`] but with an explicit file that must exist and parse.
pub fn load_settings_from(path: &Path) -> PanelResult<Settings> {
    let mut settings = Settings::default();
    apply_file_settings(&mut settings, read_settings_file(path)?);
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn read_settings_file(path: &Path) -> PanelResult<FileSettings> {
    let raw = fs::read_to_string(path).map_err(|source| PanelError::SettingsIo {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| PanelError::SettingsFormat {
        path: path.display().to_string(),
        source,
    })
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.api_key {
        settings.api_key = Some(v);
    }
    if let Some(v) = file_cfg.default_extrusion_length {
        settings.default_extrusion_length = v;
    }
    if let Some(v) = file_cfg.inverted_axes {
        settings.inverted_axes = v;
    }
    if let Some(v) = file_cfg.event_buffer {
        settings.event_buffer = v;
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("PANEL_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("APP__API_KEY") {
        settings.api_key = Some(v).filter(|key| !key.is_empty());
    }

    if let Some(v) = lookup("APP__DEFAULT_EXTRUSION_LENGTH") {
        if let Ok(parsed) = v.parse::<f64>() {
            settings.default_extrusion_length = parsed;
        }
    }

    if let Some(v) = lookup("APP__INVERTED_AXES") {
        settings.inverted_axes = v.split(',').filter_map(Axis::parse).collect();
    }

    if let Some(v) = lookup("APP__EVENT_BUFFER") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.event_buffer = parsed.max(1);
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
