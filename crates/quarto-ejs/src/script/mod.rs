/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in evaluator for a JavaScript expression subset.
//!
//! Supported: literals (including array and object literals), member and
//! index access with optional chaining, arithmetic, comparison, logical and
//! conditional operators, `typeof`, assignment and update expressions,
//! `var`/`let`/`const` declarations, `if`/`else`, `while`, `for`, `for..of`
//! and `for..in` statements, common string/array/number methods, `JSON`,
//! `Math`, `Object.keys`-style helpers, and host functions registered with
//! [`ScriptEvaluator::with_function`].
//!
//! Function definitions, arrow functions, template literals and `new` are
//! rejected with [`EvalError::Unsupported`](crate::error::EvalError::Unsupported).

mod eval;
mod lexer;
mod parser;
mod value;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::EvalResult;
use crate::evaluator::{ExpressionEvaluator, Scope};
use eval::Interpreter;
use parser::{parse_expression, parse_statements};

/// A function callable from template fragments.
///
/// Errors are reported as [`EvalError::Function`](crate::error::EvalError::Function).
pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// The default [`ExpressionEvaluator`].
#[derive(Clone, Default)]
pub struct ScriptEvaluator {
    functions: HashMap<String, HostFunction>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function callable by name. Host functions take precedence
    /// over the built-in globals (`String`, `parseInt`, ...).
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }
}

impl fmt::Debug for ScriptEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("ScriptEvaluator")
            .field("functions", &names)
            .finish()
    }
}

impl ExpressionEvaluator for ScriptEvaluator {
    fn evaluate(&self, expression: &str, scope: &mut Scope) -> EvalResult<Value> {
        let expr = parse_expression(expression)?;
        Interpreter::new(&self.functions).eval(&expr, scope)
    }

    fn execute(&self, statement: &str, scope: &mut Scope) -> EvalResult<()> {
        let statements = parse_statements(statement)?;
        let interpreter = Interpreter::new(&self.functions);
        statements
            .iter()
            .try_for_each(|stmt| interpreter.exec(stmt, scope))
    }
}
