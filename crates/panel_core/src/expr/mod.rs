//! Restricted scripting for custom control `enabled` predicates and
//! `javascript` actions.
//!
//! Authored strings run inside a locked-down rhai engine: no packages that
//! touch the host, no module loading, and caps on depth, operations and
//! data size. The JSON scope (`data`, `state`, `user`) is bound as
//! constants. Actions do not perform I/O themselves; they record
//! [`Effect`]s that the dispatcher executes afterwards.

mod context;
mod engine;

use rhai::{EvalAltResult, ParseError, AST};
use serde_json::Value;
use thiserror::Error;

pub use context::{truthy, Effect, EvalContext, Role};

/// Longest source accepted for a single `enabled` or `javascript` field.
pub const MAX_SOURCE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("source is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("unknown function {signature}")]
    UnknownFunction { signature: String },
    #[error("effect '{name}' is not allowed in an enabled predicate")]
    EffectNotAllowed { name: String },
    #[error("resource limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<ParseError> for ExprError {
    fn from(err: ParseError) -> Self {
        let ParseError(kind, position) = err;
        Self::Parse {
            message: kind.to_string(),
            line: position.line().unwrap_or(0),
            column: position.position().unwrap_or(0),
        }
    }
}

impl From<Box<EvalAltResult>> for ExprError {
    fn from(err: Box<EvalAltResult>) -> Self {
        match *err {
            EvalAltResult::ErrorFunctionNotFound(signature, _) => {
                Self::UnknownFunction { signature }
            }
            EvalAltResult::ErrorParsing(kind, position) => {
                Self::from(ParseError(Box::new(kind), position))
            }
            limit @ (EvalAltResult::ErrorTooManyOperations(_)
            | EvalAltResult::ErrorDataTooLarge(..)
            | EvalAltResult::ErrorStackOverflow(_)) => Self::LimitExceeded(limit.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// A compiled `enabled` or `javascript` source.
#[derive(Debug, Clone)]
pub struct Program {
    ast: AST,
}

impl Program {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(ExprError::TooLong {
                len: source.len(),
                max: MAX_SOURCE_LEN,
            });
        }
        let ast = engine::sandboxed().compile(source)?;
        Ok(Self { ast })
    }

    /// Runs the program; the value of the last statement is returned.
    pub fn evaluate(&self, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError> {
        engine::run(&self.ast, ctx)
    }
}

#[cfg(test)]
#[path = "../tests/expr_tests.rs"]
mod tests;
