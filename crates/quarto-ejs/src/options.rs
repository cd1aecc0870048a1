/*
 * options.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compilation options.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::escape::escape_xml;

/// Default delimiter character (`<% ... %>`).
pub const DEFAULT_DELIMITER: char = '%';

/// Function used by `<%= ... %>` tags to escape rendered values.
pub type EscapeFn = fn(&str) -> String;

/// Options controlling how a template is compiled and rendered.
///
/// Deserializable so project configuration files can carry the
/// same settings as the command line (`delimiter`, `trim-whitespace`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompileOptions {
    /// Tag delimiter character.
    pub delimiter: char,

    /// Strip leading and trailing blank runs on every line before tokenizing.
    pub trim_whitespace: bool,

    /// Track source lines and annotate runtime failures with context.
    pub compile_diagnostics: bool,

    /// Log the generated program listing.
    pub debug: bool,

    /// Bind every top-level key of the data context as a local name.
    ///
    /// When off, data is only reachable through `locals`.
    pub strict_locals_scope: bool,

    /// Cache compiled artifacts by source path.
    pub cache_artifacts: bool,

    /// Path of the template being compiled. Required for includes and caching.
    pub source_path: Option<PathBuf>,

    /// Global bindings visible to every fragment, below the data context.
    pub evaluation_scope: Option<Value>,

    /// Drop literal segments that contain only whitespace.
    pub drop_blank_segments: bool,

    /// Escape function applied by `<%= ... %>`.
    #[serde(skip, default = "default_escape")]
    pub escape: EscapeFn,
}

fn default_escape() -> EscapeFn {
    escape_xml
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            trim_whitespace: false,
            compile_diagnostics: true,
            debug: false,
            strict_locals_scope: true,
            cache_artifacts: false,
            source_path: None,
            evaluation_scope: None,
            drop_blank_segments: true,
            escape: escape_xml,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_trim_whitespace(mut self, trim: bool) -> Self {
        self.trim_whitespace = trim;
        self
    }

    pub fn with_compile_diagnostics(mut self, enabled: bool) -> Self {
        self.compile_diagnostics = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_strict_locals_scope(mut self, strict: bool) -> Self {
        self.strict_locals_scope = strict;
        self
    }

    pub fn with_cache_artifacts(mut self, cache: bool) -> Self {
        self.cache_artifacts = cache;
        self
    }

    pub fn with_evaluation_scope(mut self, scope: Value) -> Self {
        self.evaluation_scope = Some(scope);
        self
    }

    pub fn with_drop_blank_segments(mut self, drop: bool) -> Self {
        self.drop_blank_segments = drop;
        self
    }

    pub fn with_escape(mut self, escape: EscapeFn) -> Self {
        self.escape = escape;
        self
    }

    /// Options for a template included from the template compiled with `self`.
    pub(crate) fn for_include(&self, path: PathBuf) -> Self {
        let mut opts = self.clone();
        opts.source_path = Some(path);
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CompileOptions::default();
        assert_eq!(opts.delimiter, '%');
        assert!(opts.compile_diagnostics);
        assert!(opts.strict_locals_scope);
        assert!(opts.drop_blank_segments);
        assert!(!opts.trim_whitespace);
        assert!(!opts.cache_artifacts);
        assert!(opts.source_path.is_none());
        assert_eq!((opts.escape)("<b>"), "&lt;b&gt;");
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let opts: CompileOptions = serde_json::from_str(
            r#"{"delimiter": "?", "trim-whitespace": true, "compile-diagnostics": false}"#,
        )
        .unwrap();
        assert_eq!(opts.delimiter, '?');
        assert!(opts.trim_whitespace);
        assert!(!opts.compile_diagnostics);
        // Unspecified fields keep their defaults
        assert!(opts.strict_locals_scope);
    }

    #[test]
    fn test_deserialize_rejects_unknown_keys() {
        let result: Result<CompileOptions, _> = serde_json::from_str(r#"{"client": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_for_include_keeps_settings() {
        let opts = CompileOptions::new()
            .with_delimiter('$')
            .with_source_path("/t/index.ejs");
        let nested = opts.for_include(PathBuf::from("/t/header.ejs"));
        assert_eq!(nested.delimiter, '$');
        assert_eq!(nested.source_path, Some(PathBuf::from("/t/header.ejs")));
    }
}
