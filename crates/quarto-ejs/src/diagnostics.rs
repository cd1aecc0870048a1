/*
 * diagnostics.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Source context for runtime failures.

use crate::error::{EvalError, TemplateError};

/// Lines shown before the failing line.
const CONTEXT_BEFORE: usize = 3;
/// Lines shown from the failing line on.
const CONTEXT_AFTER: usize = 3;

/// Render the lines around `line` (1-based), marking `line` with ` >> `.
///
/// ```
/// use quarto_ejs::diagnostics::error_context;
///
/// let context = error_context("a\nb\nc", 2);
/// assert_eq!(context, "    1| a\n >> 2| b\n    3| c");
/// ```
pub fn error_context(text: &str, line: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let start = line.saturating_sub(CONTEXT_BEFORE);
    let end = lines.len().min(line + CONTEXT_AFTER);
    (start..end)
        .map(|index| {
            let number = index + 1;
            let marker = if number == line { " >> " } else { "    " };
            format!("{marker}{number}| {}", lines[index])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap an evaluation failure with file name, line and source context.
pub fn annotate(filename: &str, text: &str, line: usize, source: EvalError) -> TemplateError {
    TemplateError::RuntimeEvaluation {
        filename: filename.to_string(),
        line,
        context: error_context(text, line),
        source,
    }
}
