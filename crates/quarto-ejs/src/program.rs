/*
 * program.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The generated program.
//!
//! Compiling a template produces a flat list of [`Instruction`]s. Embedded
//! fragments are carried verbatim; only the runtime (through an
//! [`ExpressionEvaluator`](crate::evaluator::ExpressionEvaluator)) interprets
//! them. The [`Display`](std::fmt::Display) impl renders the program as a
//! JavaScript-like function body, which is what `debug` logging, `prebuild`
//! and the CLI `compile` command show.

use std::fmt;
use std::sync::Arc;

use crate::escape::escape_string_literal;

/// Source text of an included template, kept for error context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOrigin {
    /// Display name of the included file.
    pub filename: String,
    /// The included template's normalized text.
    pub text: Arc<str>,
}

/// Bindings for a scope opened by an include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    /// Parameter expressions, evaluated in the enclosing scope and merged
    /// left to right (later keys win).
    pub params: Vec<String>,
    /// Hide the enclosing scope's bindings.
    pub isolated: bool,
    /// Present when the scope holds another template's code.
    pub origin: Option<Arc<SourceOrigin>>,
}

/// One step of a generated program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Append literal text.
    Append(String),
    /// Evaluate an expression and append its escaped string form.
    AppendEscaped(String),
    /// Evaluate an expression and append its string form unescaped.
    AppendRaw(String),
    /// Execute a statement fragment.
    Exec(String),
    /// The source line of the following instructions.
    Line(usize),
    EnterScope(ScopeEntry),
    ExitScope,
    /// Redirect output into a capture buffer and evaluate the params.
    BeginCapture { params: String },
    /// Restore the output sink and record the captured block.
    EndCapture,
}

/// A generated program: instructions in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Append another program's instructions.
    pub fn extend(&mut self, other: Program) {
        self.instructions.extend(other.instructions);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Number of `with` blocks opened by each active scope
        let mut scopes: Vec<usize> = Vec::new();
        for instruction in &self.instructions {
            match instruction {
                Instruction::Append(text) => {
                    writeln!(f, "    ; __append(\"{}\")", escape_string_literal(text))?
                }
                Instruction::AppendEscaped(expr) => writeln!(f, "    ; __append(escape({expr}))")?,
                Instruction::AppendRaw(expr) => writeln!(f, "    ; __append({expr})")?,
                Instruction::Exec(statement) => writeln!(f, "    ; {statement}")?,
                Instruction::Line(line) => writeln!(f, "    ; __line = {line}")?,
                Instruction::EnterScope(entry) => {
                    writeln!(f, "    ; (function(){{")?;
                    for params in &entry.params {
                        writeln!(f, "  with ({params} || {{}}) {{")?;
                    }
                    scopes.push(entry.params.len());
                }
                Instruction::ExitScope => {
                    for _ in 0..scopes.pop().unwrap_or(0) {
                        writeln!(f, "  }}")?;
                    }
                    writeln!(f, "    ; }})()")?;
                }
                Instruction::BeginCapture { params } => {
                    writeln!(
                        f,
                        "    ; var __capture = {{ params: {params}, html: [] }}, __main = __append; __append = function (o) {{ __capture.html.push(o) }}"
                    )?;
                }
                Instruction::EndCapture => {
                    writeln!(f, "    ; __append = __main; includeAt(__capture, includeAtarray)")?;
                }
            }
        }
        Ok(())
    }
}
