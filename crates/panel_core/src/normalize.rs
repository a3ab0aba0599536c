//! Control Normalizer: converts raw [`ControlNode`]s into immutable,
//! render-ready [`NormalizedControl`]s.
//!
//! A normalized control is only ever produced once per raw node. Feeding an
//! already normalized entry back in returns the same `Arc`, so output slots
//! and bound callables survive repeated renders untouched.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use shared::domain::{ControlKey, Layout, TemplateKey};

use crate::{
    binding::{bind, Binding},
    feedback::FeedbackRegistry,
    slot::Slot,
    tree::{ControlNode, InputField, SliderSpec},
};

#[derive(Debug, Clone)]
pub enum ControlEntry {
    Raw(ControlNode),
    Normalized(Arc<NormalizedControl>),
}

impl From<ControlNode> for ControlEntry {
    fn from(node: ControlNode) -> Self {
        Self::Raw(node)
    }
}

impl From<Arc<NormalizedControl>> for ControlEntry {
    fn from(control: Arc<NormalizedControl>) -> Self {
        Self::Normalized(control)
    }
}

#[derive(Debug)]
pub struct NormalizedControl {
    pub name: Option<String>,
    pub key: Option<ControlKey>,
    pub template_key: Option<TemplateKey>,
    pub template: Option<String>,
    pub regex: Option<String>,
    pub output: Option<Slot>,
    /// Only set for containers.
    pub layout: Option<Layout>,
    pub children: Option<Vec<Arc<NormalizedControl>>>,
    pub inputs: Option<Vec<NormalizedInput>>,
    pub action: Option<Binding>,
    pub enabled: Option<Binding>,
    pub command: Option<String>,
    pub commands: Option<Vec<String>>,
    pub script: Option<String>,
    pub context: Option<Map<String, Value>>,
    pub confirm: Option<String>,
    pub width: Option<u8>,
    pub offset: Option<u8>,
}

#[derive(Debug)]
pub struct NormalizedInput {
    pub name: Option<String>,
    pub parameter: Option<String>,
    pub default: Value,
    pub value: Slot,
    pub slider: SliderSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Container,
    Control,
}

impl NormalizedControl {
    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    pub fn display_mode(&self) -> DisplayMode {
        if self.is_container() {
            DisplayMode::Container
        } else {
            DisplayMode::Control
        }
    }

    /// Grid classes for the control's row: `span{width}` (default 2) and an optional offset.
    pub fn row_css(&self) -> String {
        let span = format!("span{}", self.width.unwrap_or(2));
        match self.offset {
            Some(offset) => format!("{span} offset{offset}"),
            None => span,
        }
    }

    /// Looks an input up by its parameter name, or its display name when it
    /// has none. Same key as `data.inputs` in the expression scope.
    pub fn input(&self, label: &str) -> Option<&NormalizedInput> {
        self.inputs.as_deref()?.iter().find(|input| {
            input.parameter.as_deref().or(input.name.as_deref()) == Some(label)
        })
    }

    pub fn child(&self, index: usize) -> Option<&Arc<NormalizedControl>> {
        self.children.as_ref()?.get(index)
    }

    pub fn view(&self) -> ControlView {
        ControlView {
            name: self.name.clone(),
            key: self.key.clone(),
            template_key: self.template_key.clone(),
            output: self.output.as_ref().map(Slot::get),
            display_mode: self.display_mode(),
            layout: self.layout,
            row_css: self.row_css(),
            confirm: self.confirm.clone(),
            has_action: self.action.is_some(),
            has_enabled: self.enabled.is_some(),
            inputs: self
                .inputs
                .iter()
                .flatten()
                .map(|input| InputView {
                    name: input.name.clone(),
                    parameter: input.parameter.clone(),
                    value: input.value.get(),
                    slider: input.slider,
                })
                .collect(),
            children: self
                .children
                .iter()
                .flatten()
                .map(|child| child.view())
                .collect(),
        }
    }
}

/// Serializable snapshot of a normalized control, with slot values read at call time.
#[derive(Debug, Clone, Serialize)]
pub struct ControlView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ControlKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_key: Option<TemplateKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub display_mode: DisplayMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    pub row_css: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<String>,
    pub has_action: bool,
    pub has_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ControlView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    pub value: Value,
    pub slider: SliderSpec,
}

pub fn normalize(entry: ControlEntry, registry: &mut FeedbackRegistry) -> Arc<NormalizedControl> {
    match entry {
        ControlEntry::Normalized(control) => control,
        ControlEntry::Raw(node) => Arc::new(normalize_node(node, registry)),
    }
}

/// Element-wise, order-preserving.
pub fn normalize_all(
    entries: Vec<ControlEntry>,
    registry: &mut FeedbackRegistry,
) -> Vec<Arc<NormalizedControl>> {
    entries
        .into_iter()
        .map(|entry| normalize(entry, registry))
        .collect()
}

fn normalize_node(node: ControlNode, registry: &mut FeedbackRegistry) -> NormalizedControl {
    let output = match (&node.key, &node.template_key) {
        (Some(key), Some(template_key)) => {
            let slot = Slot::empty_output();
            registry.register(key.clone(), template_key.clone(), slot.clone());
            Some(slot)
        }
        _ => None,
    };

    let layout = node
        .children
        .as_ref()
        .map(|_| Layout::resolve(node.layout.as_ref().and_then(Value::as_str)));

    let children = node.children.map(|children| {
        children
            .into_iter()
            .map(|child| Arc::new(normalize_node(child, registry)))
            .collect()
    });

    let inputs = node
        .inputs
        .map(|inputs| inputs.into_iter().map(normalize_input).collect());

    NormalizedControl {
        name: node.name,
        key: node.key,
        template_key: node.template_key,
        template: node.template,
        regex: node.regex,
        output,
        layout,
        children,
        inputs,
        action: node.action.as_ref().map(bind),
        enabled: node.enabled.as_ref().map(bind),
        command: node.command,
        commands: node.commands,
        script: node.script,
        context: node.context,
        confirm: node.confirm,
        width: node.width,
        offset: node.offset,
    }
}

fn normalize_input(input: InputField) -> NormalizedInput {
    let default = input.default.unwrap_or(Value::Null);
    NormalizedInput {
        name: input.name,
        parameter: input.parameter,
        value: Slot::new(default.clone()),
        default,
        slider: input.slider.unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
