use serde_json::{Map, Value};

use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `enabled`: pure, result interpreted as a boolean.
    Predicate,
    /// `javascript`: may record effects, result discarded.
    Action,
}

/// Side effects requested by an action, executed by the dispatcher in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Command(String),
    Commands(Vec<String>),
    Script {
        name: String,
        context: Option<Map<String, Value>>,
    },
    SetInput {
        parameter: String,
        value: Value,
    },
    /// Send the control's own command payload.
    Send,
    Log(Value),
}

pub struct EvalContext<'a> {
    pub(super) scope: &'a Value,
    pub(super) role: Role,
    effects: Vec<Effect>,
}

impl<'a> EvalContext<'a> {
    pub fn new(scope: &'a Value, role: Role) -> Self {
        Self {
            scope,
            role,
            effects: Vec::new(),
        }
    }

    pub fn predicate(scope: &'a Value) -> Self {
        Self::new(scope, Role::Predicate)
    }

    pub fn action(scope: &'a Value) -> Self {
        Self::new(scope, Role::Action)
    }

    pub fn scope(&self) -> &Value {
        self.scope
    }

    pub fn emit(&mut self, name: &str, effect: Effect) -> Result<(), ExprError> {
        if self.role == Role::Predicate {
            return Err(ExprError::EffectNotAllowed {
                name: name.to_string(),
            });
        }
        self.effects.push(effect);
        Ok(())
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    pub(super) fn extend(&mut self, effects: Vec<Effect>) {
        self.effects.extend(effects);
    }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
