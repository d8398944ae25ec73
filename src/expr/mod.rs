//! The boolean expression runtime that backs routing-rule evaluation.
//!
//! Built on `cel-interpreter`: parse-time validation, a typed variable
//! environment bound per evaluation, and programs cached by `(rule_id,
//! expression)` in a `DashMap` — the same write-rare/read-hot concurrent
//! map the teacher's provider surface uses for per-path locking
//! (`unicity-astrid-astrid/crates/astrid-vfs/src/overlay.rs::OverlayVfs::copy_locks`).

mod cache;
mod variables;

use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::{Context, Program};

use crate::error::GovernanceError;

pub use variables::ExprVariables;

/// A compiled rule program. The empty-string expression is legal and
/// means "always true"; it never reaches the CEL parser.
pub enum CompiledProgram {
    AlwaysTrue,
    Cel(Program),
}

pub struct ExpressionRuntime {
    cache: cache::ProgramCache,
}

impl Default for ExpressionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionRuntime {
    pub fn new() -> Self {
        Self {
            cache: cache::ProgramCache::default(),
        }
    }

    /// Parse-only check. The empty string is valid ("always true"); a bare
    /// identifier with no operator is not a boolean expression and is
    /// rejected even though it would parse as a valid CEL value
    /// expression.
    pub fn validate(expr: &str) -> Result<(), GovernanceError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if is_bare_identifier(trimmed) {
            return Err(GovernanceError::InvalidExpression(format!(
                "bare identifier is not a boolean expression: {trimmed}"
            )));
        }
        Program::compile(trimmed)
            .map(|_| ())
            .map_err(|err| GovernanceError::InvalidExpression(err.to_string()))
    }

    /// Compiles `expression` and caches it under `(rule_id, expression)`.
    /// Re-issuing the same key returns the cached instance (object
    /// identity). A parse error is never cached.
    pub fn compile_and_cache(
        &self,
        rule_id: &str,
        expression: &str,
    ) -> Result<Arc<CompiledProgram>, GovernanceError> {
        if let Some(existing) = self.cache.get(rule_id, expression) {
            return Ok(existing);
        }

        Self::validate(expression)?;

        let trimmed = expression.trim();
        let compiled = if trimmed.is_empty() {
            CompiledProgram::AlwaysTrue
        } else {
            CompiledProgram::Cel(
                Program::compile(trimmed)
                    .map_err(|err| GovernanceError::InvalidExpression(err.to_string()))?,
            )
        };

        Ok(self.cache.insert(rule_id, expression, compiled))
    }

    /// Invalidates every cached program for `rule_id` (the rule was
    /// updated or deleted).
    pub fn invalidate(&self, rule_id: &str) {
        self.cache.invalidate(rule_id);
    }

    /// Evaluates `program` against `variables`. A missing map key inside
    /// the expression (`headers['x']`) resolves to `false` for the whole
    /// expression rather than propagating an error; only a genuinely
    /// absent program is an error.
    pub fn evaluate(
        program: Option<&CompiledProgram>,
        variables: &ExprVariables,
    ) -> Result<bool, GovernanceError> {
        let program = program.ok_or(GovernanceError::NilProgram)?;
        match program {
            CompiledProgram::AlwaysTrue => Ok(true),
            CompiledProgram::Cel(program) => {
                let mut context = Context::default();
                variables.bind(&mut context)?;
                match program.execute(&context) {
                    Ok(cel_interpreter::Value::Bool(value)) => Ok(value),
                    Ok(_) | Err(_) => Ok(false),
                }
            }
        }
    }
}

fn is_bare_identifier(expr: &str) -> bool {
    if expr == "true" || expr == "false" {
        return false;
    }
    let mut chars = expr.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok && expr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub type HeaderMap = HashMap<String, String>;
