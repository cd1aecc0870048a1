/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The expression-evaluation capability.
//!
//! The compiler never interprets embedded fragments. At render time the
//! runtime hands them to an [`ExpressionEvaluator`] together with the
//! current [`Scope`]. Statement fragments that open or close blocks across
//! tags (`<% if (a) { %> ... <% } %>`) are recognized with
//! [`ExpressionEvaluator::classify`] so the runtime can structure them.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{EvalError, EvalResult};

/// Evaluates embedded fragments against a scope.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate an expression (`<%= expr %>`, `<%- expr %>`, directive params,
    /// block conditions).
    fn evaluate(&self, expression: &str, scope: &mut Scope) -> EvalResult<Value>;

    /// Execute a statement fragment (`<% stmt %>`).
    fn execute(&self, statement: &str, scope: &mut Scope) -> EvalResult<()>;

    /// Classify a statement fragment for block structuring.
    fn classify(&self, statement: &str) -> Statement {
        classify_statement(statement)
    }

    /// String form of a value appended to the output.
    fn to_output(&self, value: &Value) -> String {
        display_value(value)
    }
}

/// How a statement fragment relates to block structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Complete on its own.
    Simple,
    /// Opens a block that a later fragment closes.
    Open(BlockHeader),
    /// `} else {` (`None`) or `} else if (cond) {`.
    Else(Option<String>),
    /// `}`, `})` or `});`
    Close,
}

/// Header of a block opened by a statement fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHeader {
    If {
        condition: String,
    },
    While {
        condition: String,
    },
    ForOf {
        binding: String,
        iterable: String,
    },
    ForIn {
        binding: String,
        object: String,
    },
    For {
        init: Option<String>,
        condition: Option<String>,
        update: Option<String>,
    },
    /// `list.forEach(function (item, index) {`
    ForEach {
        iterable: String,
        item: String,
        index: Option<String>,
    },
}

static CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\}\s*\)?\s*;?$").expect("valid regex"));
static ELSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\}\s*else\s*\{$").expect("valid regex"));
static ELSE_IF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\}\s*else\s+if\s*\((.*)\)\s*\{$").expect("valid regex")
});
static IF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^if\s*\((.*)\)\s*\{$").expect("valid regex"));
static WHILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^while\s*\((.*)\)\s*\{$").expect("valid regex"));
static FOR_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^for\s*\(\s*(?:(?:var|let|const)\s+)?([A-Za-z_$][\w$]*)\s+of\s+(.*)\)\s*\{$")
        .expect("valid regex")
});
static FOR_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^for\s*\(\s*(?:(?:var|let|const)\s+)?([A-Za-z_$][\w$]*)\s+in\s+(.*)\)\s*\{$")
        .expect("valid regex")
});
static FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^for\s*\(([^;]*);([^;]*);([^;]*)\)\s*\{$").expect("valid regex")
});
static FOR_EACH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^(.+?)\.forEach\(\s*(?:function\s*)?\(?\s*([A-Za-z_$][\w$]*)\s*(?:,\s*([A-Za-z_$][\w$]*)\s*)?\)?\s*(?:=>\s*)?\{$",
    )
    .expect("valid regex")
});

/// Classify a statement fragment by its syntactic shape.
pub fn classify_statement(fragment: &str) -> Statement {
    let fragment = fragment.trim();

    if CLOSE.is_match(fragment) {
        return Statement::Close;
    }
    if ELSE.is_match(fragment) {
        return Statement::Else(None);
    }
    if let Some(caps) = ELSE_IF.captures(fragment) {
        return Statement::Else(Some(caps[1].trim().to_string()));
    }
    if let Some(caps) = IF.captures(fragment) {
        return Statement::Open(BlockHeader::If {
            condition: caps[1].trim().to_string(),
        });
    }
    if let Some(caps) = WHILE.captures(fragment) {
        return Statement::Open(BlockHeader::While {
            condition: caps[1].trim().to_string(),
        });
    }
    if let Some(caps) = FOR_OF.captures(fragment) {
        return Statement::Open(BlockHeader::ForOf {
            binding: caps[1].to_string(),
            iterable: caps[2].trim().to_string(),
        });
    }
    if let Some(caps) = FOR_IN.captures(fragment) {
        return Statement::Open(BlockHeader::ForIn {
            binding: caps[1].to_string(),
            object: caps[2].trim().to_string(),
        });
    }
    if let Some(caps) = FOR.captures(fragment) {
        let part = |i: usize| Some(caps[i].trim().to_string()).filter(|p| !p.is_empty());
        return Statement::Open(BlockHeader::For {
            init: part(1),
            condition: part(2),
            update: part(3),
        });
    }
    if let Some(caps) = FOR_EACH.captures(fragment) {
        return Statement::Open(BlockHeader::ForEach {
            iterable: caps[1].trim().to_string(),
            item: caps[2].to_string(),
            index: caps.get(3).map(|m| m.as_str().to_string()),
        });
    }
    Statement::Simple
}

/// JavaScript truthiness. `null` stands in for `undefined`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The string a value contributes to the output.
///
/// `null` renders as nothing, arrays join their elements with commas,
/// objects render as `[object Object]`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_default(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Values visited by `for (x of value)` and `value.forEach(...)`.
///
/// Arrays yield their elements and strings their characters. Anything else
/// is not iterable.
pub fn iterate_values(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Null => Err(EvalError::type_error("undefined is not iterable")),
        other => Err(EvalError::type_error(format!(
            "{} is not iterable",
            display_value(other)
        ))),
    }
}

/// Keys visited by `for (k in value)`, as strings.
///
/// Array and string positions are enumerated like object keys; `null`
/// enumerates nothing.
pub fn iterate_keys(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(map) => map.keys().map(|k| Value::String(k.clone())).collect(),
        Value::Array(items) => (0..items.len()).map(|i| Value::String(i.to_string())).collect(),
        Value::String(s) => (0..s.chars().count())
            .map(|i| Value::String(i.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Format a number the way JavaScript's `String(n)` does for common values.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n < 0.0 { "-" } else { "" };
        format!("{sign}Infinity")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Variable bindings visible to fragments.
///
/// Frames are searched innermost first. A frame opened with `isolated` hides
/// every frame below it; globals stay visible from everywhere.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    globals: Map<String, Value>,
    frames: Vec<Frame>,
}

#[derive(Debug, Clone)]
struct Frame {
    vars: Map<String, Value>,
    function: bool,
    isolated: bool,
}

impl Scope {
    pub fn new(globals: Map<String, Value>) -> Self {
        Self {
            globals,
            frames: Vec::new(),
        }
    }

    /// Open a frame that receives `var` declarations (a template or include
    /// body).
    pub fn push_function(&mut self, vars: Map<String, Value>, isolated: bool) {
        self.frames.push(Frame {
            vars,
            function: true,
            isolated,
        });
    }

    /// Open a block frame (loop iteration, `if` body).
    pub fn push_block(&mut self) {
        self.frames.push(Frame {
            vars: Map::new(),
            function: false,
            isolated: false,
        });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Restore a depth recorded with [`Scope::depth`].
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.position(name) {
            Some(index) => self.frames[index].vars.get(name),
            None => self.globals.get(name),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self.position(name) {
            Some(index) => self.frames[index].vars.get_mut(name),
            None => self.globals.get_mut(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind in the innermost frame (`let`, `const`, loop bindings).
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.vars.insert(name.into(), value),
            None => self.globals.insert(name.into(), value),
        };
    }

    /// Bind in the innermost function frame (`var`).
    pub fn declare_var(&mut self, name: impl Into<String>, value: Value) {
        match self.frames.iter_mut().rev().find(|f| f.function) {
            Some(frame) => frame.vars.insert(name.into(), value),
            None => self.globals.insert(name.into(), value),
        };
    }

    /// Assign to the visible binding of `name`, creating a global when there
    /// is none.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            if frame.vars.contains_key(name) {
                return Some(index);
            }
            if frame.isolated {
                break;
            }
        }
        None
    }
}
