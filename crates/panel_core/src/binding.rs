//! Expression Binder: turns an authored `enabled`/`javascript` field into a
//! callable with the fixed `(context) -> result` signature.

use std::{fmt, sync::Arc};

use serde::Deserialize;
use serde_json::Value;

use crate::expr::{truthy, Effect, EvalContext, ExprError, Program};

pub trait Evaluate: Send + Sync {
    fn call(&self, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError>;
}

impl<F> Evaluate for F
where
    F: Fn(&mut EvalContext<'_>) -> Result<Value, ExprError> + Send + Sync,
{
    fn call(&self, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError> {
        self(ctx)
    }
}

#[derive(Clone)]
pub struct Binding(Arc<dyn Evaluate>);

impl Binding {
    pub fn new(evaluate: impl Evaluate + 'static) -> Self {
        Self(Arc::new(evaluate))
    }

    pub fn call(&self, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError> {
        self.0.call(ctx)
    }

    pub fn same_binding(&self, other: &Binding) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn evaluate_predicate(&self, scope: &Value) -> Result<bool, ExprError> {
        let mut ctx = EvalContext::predicate(scope);
        let value = self.call(&mut ctx)?;
        Ok(truthy(&value))
    }

    pub fn evaluate_action(&self, scope: &Value) -> Result<Vec<Effect>, ExprError> {
        let mut ctx = EvalContext::action(scope);
        self.call(&mut ctx)?;
        Ok(ctx.into_effects())
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Binding(..)")
    }
}

/// Raw `enabled`/`javascript` field: authored source text, or a callable
/// supplied by an in-process contributor.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub enum Behavior {
    Expression(String),
    Native(Binding),
}

impl Behavior {
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&mut EvalContext<'_>) -> Result<Value, ExprError> + Send + Sync + 'static,
    {
        Self::Native(Binding::new(f))
    }
}

impl From<String> for Behavior {
    fn from(value: String) -> Self {
        Self::Expression(value)
    }
}

impl From<&str> for Behavior {
    fn from(value: &str) -> Self {
        Self::Expression(value.to_string())
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(source) => f.debug_tuple("Expression").field(source).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

struct CompiledExpression {
    program: Result<Program, ExprError>,
}

impl Evaluate for CompiledExpression {
    // Parse failures are reported here, at call time, not while binding.
    fn call(&self, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError> {
        match &self.program {
            Ok(program) => program.evaluate(ctx),
            Err(err) => Err(err.clone()),
        }
    }
}

/// Callables pass through unchanged; source text is compiled once.
pub fn bind(behavior: &Behavior) -> Binding {
    match behavior {
        Behavior::Native(binding) => binding.clone(),
        Behavior::Expression(source) => Binding::new(CompiledExpression {
            program: Program::parse(source),
        }),
    }
}

#[cfg(test)]
#[path = "tests/binding_tests.rs"]
mod tests;
