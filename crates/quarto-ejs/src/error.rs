/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and rendering.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while compiling or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// An opening tag without a matching closing tag.
    #[error("Could not find matching close tag for \"{tag}\" (line {line})")]
    MalformedTag {
        tag: String,
        line: usize,
        /// Byte offset of the opening tag in `source_text`.
        offset: usize,
        /// Template the tag appears in, when known. For a nested include
        /// this is the included file.
        path: Option<PathBuf>,
        /// Normalized text of that template.
        source_text: Arc<str>,
    },

    /// An operation needs the template's source path but none was given.
    #[error("`{operation}` requires the 'source_path' option")]
    MissingFilename { operation: &'static str },

    /// Component lookup failed.
    ///
    /// `includeModule` treats this as non-fatal and skips the include.
    #[error("Component not found: {name}")]
    UnresolvedComponent { name: String },

    /// Reading a template given directly to the compiler failed.
    #[error("Failed to read template {}: {source}", path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a template referenced by an include directive failed.
    #[error("Failed to read included template {}: {source}", path.display())]
    IncludeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template includes itself, directly or through other templates.
    #[error("Cyclic include of {}: {}", path.display(), format_chain(chain))]
    CyclicInclude { path: PathBuf, chain: Vec<PathBuf> },

    /// The delimiter collides with the tag syntax.
    #[error("Invalid delimiter {delimiter:?}: tag brackets, modifiers and whitespace are not allowed")]
    InvalidDelimiter { delimiter: char },

    /// An embedded fragment failed at render time, annotated with source context.
    #[error("{filename}:{line}\n{context}\n\n{source}")]
    RuntimeEvaluation {
        filename: String,
        line: usize,
        context: String,
        #[source]
        source: EvalError,
    },

    /// An embedded fragment failed at render time (diagnostics disabled).
    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

impl TemplateError {
    /// Whether the compiler may recover from this error and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TemplateError::UnresolvedComponent { .. })
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised by an [`ExpressionEvaluator`](crate::evaluator::ExpressionEvaluator)
/// or by the runtime while executing a compiled program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A name is not bound in any scope.
    #[error("{name} is not defined")]
    UndefinedName { name: String },

    /// An operation was applied to a value of the wrong type.
    #[error("TypeError: {message}")]
    Type { message: String },

    /// The fragment could not be parsed.
    #[error("SyntaxError: {message} in `{fragment}`")]
    Syntax { message: String, fragment: String },

    /// The fragment uses a construct the evaluator does not support.
    #[error("Unsupported {construct} in `{fragment}`")]
    Unsupported { construct: String, fragment: String },

    /// Statement fragments do not form properly nested blocks.
    #[error("Unbalanced block: {message}")]
    UnbalancedBlock { message: String },

    /// `includeAt` blocks cannot be nested.
    #[error("Nested includeAt blocks are not supported")]
    NestedExtraction,

    /// `endAt` without a preceding `includeAt`.
    #[error("endAt without a matching includeAt")]
    UnmatchedEndExtraction,

    /// A host-registered function or built-in method failed.
    #[error("{name}(): {message}")]
    Function { name: String, message: String },
}

impl EvalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type {
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        EvalError::Syntax {
            message: message.into(),
            fragment: fragment.into(),
        }
    }

    pub fn unsupported(construct: impl Into<String>, fragment: impl Into<String>) -> Self {
        EvalError::Unsupported {
            construct: construct.into(),
            fragment: fragment.into(),
        }
    }
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for expression evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_tag_message() {
        let err = TemplateError::MalformedTag {
            tag: "<%".to_string(),
            line: 3,
            offset: 12,
            path: None,
            source_text: Arc::from("a\nb\n<%"),
        };
        assert_eq!(
            err.to_string(),
            "Could not find matching close tag for \"<%\" (line 3)"
        );
    }

    #[test]
    fn test_cyclic_include_message() {
        let err = TemplateError::CyclicInclude {
            path: PathBuf::from("/t/a.ejs"),
            chain: vec![PathBuf::from("/t/a.ejs"), PathBuf::from("/t/b.ejs")],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic include of /t/a.ejs: /t/a.ejs -> /t/b.ejs"
        );
    }

    #[test]
    fn test_only_unresolved_component_is_recoverable() {
        assert!(
            TemplateError::UnresolvedComponent {
                name: "nav".to_string()
            }
            .is_recoverable()
        );
        assert!(
            !TemplateError::MissingFilename {
                operation: "include"
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_evaluation_error_is_transparent() {
        let err: TemplateError = EvalError::UndefinedName {
            name: "user".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "user is not defined");
    }
}
