//! Raw control documents as authored on the server or contributed in-process.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use shared::domain::{ControlKey, TemplateKey};
use tracing::debug;

use crate::binding::Behavior;

/// Response body of `GET /api/printer/command/custom`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlsDocument {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub controls: Vec<ControlNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlNode {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient", alias = "identity")]
    pub key: Option<ControlKey>,
    #[serde(default, deserialize_with = "lenient")]
    pub template: Option<String>,
    #[serde(default, deserialize_with = "lenient", alias = "templateKey")]
    pub template_key: Option<TemplateKey>,
    #[serde(default, deserialize_with = "lenient")]
    pub regex: Option<String>,
    #[serde(default)]
    pub layout: Option<Value>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub children: Option<Vec<ControlNode>>,
    #[serde(default, deserialize_with = "lenient_list", rename = "input", alias = "inputs")]
    pub inputs: Option<Vec<InputField>>,
    #[serde(default, deserialize_with = "lenient", rename = "javascript", alias = "action")]
    pub action: Option<Behavior>,
    #[serde(default, deserialize_with = "lenient")]
    pub enabled: Option<Behavior>,
    #[serde(default, deserialize_with = "lenient")]
    pub command: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub commands: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub script: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub context: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient", rename = "confirm", alias = "confirmMessage")]
    pub confirm: Option<String>,
    #[serde(default, deserialize_with = "lenient", rename = "width", alias = "widthSpan")]
    pub width: Option<u8>,
    #[serde(default, deserialize_with = "lenient", rename = "offset", alias = "offsetSpan")]
    pub offset: Option<u8>,
}

impl ControlNode {
    pub fn container(name: impl Into<String>, children: Vec<ControlNode>) -> Self {
        Self {
            name: Some(name.into()),
            children: Some(children),
            ..Self::default()
        }
    }

    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn feedback(
        name: impl Into<String>,
        key: impl Into<ControlKey>,
        template_key: impl Into<TemplateKey>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            key: Some(key.into()),
            template_key: Some(template_key.into()),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<Behavior>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_enabled(mut self, enabled: impl Into<Behavior>) -> Self {
        self.enabled = Some(enabled.into());
        self
    }

    pub fn with_input(mut self, input: InputField) -> Self {
        self.inputs.get_or_insert_with(Vec::new).push(input);
        self
    }

    pub fn with_confirm(mut self, message: impl Into<String>) -> Self {
        self.confirm = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputField {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient", alias = "parameterName")]
    pub parameter: Option<String>,
    #[serde(default, alias = "defaultValue")]
    pub default: Option<Value>,
    #[serde(default, deserialize_with = "lenient", alias = "sliderEnabled")]
    pub slider: Option<SliderSpec>,
}

impl InputField {
    pub fn new(parameter: impl Into<String>, default: impl Into<Value>) -> Self {
        let parameter = parameter.into();
        Self {
            name: Some(parameter.clone()),
            parameter: Some(parameter),
            default: Some(default.into()),
            slider: None,
        }
    }
}

/// `slider` is either a plain flag or a range description.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SliderSpec {
    Toggle(bool),
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        step: Option<f64>,
    },
}

impl SliderSpec {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Toggle(false))
    }
}

impl Default for SliderSpec {
    fn default() -> Self {
        Self::Toggle(false)
    }
}

/// Malformed optional fields are dropped one by one so a single bad value
/// does not discard the whole document.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_or_drop(value))
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(items.into_iter().filter_map(parse_or_drop).collect())),
        Value::Null => Ok(None),
        other => {
            debug!(value = %other, "dropping malformed control list");
            Ok(None)
        }
    }
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient_list(deserializer)?.unwrap_or_default())
}

fn parse_or_drop<T: DeserializeOwned>(value: Value) -> Option<T> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            debug!(%value, %err, "dropping malformed control field");
            None
        }
    }
}
