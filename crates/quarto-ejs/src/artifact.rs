/*
 * artifact.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled templates.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::collector::{AssetDependencies, DependencyDescriptor};
use crate::error::TemplateResult;
use crate::evaluator::ExpressionEvaluator;
use crate::options::CompileOptions;
use crate::program::{Program, SourceOrigin};
use crate::runtime::{self, RenderOutput};
use crate::template::CompiledTemplate;

/// File name reported for templates compiled without a source path.
const ANONYMOUS_FILENAME: &str = "ejs";

/// A compiled template.
///
/// Artifacts are immutable; rendering takes the data context and an
/// evaluator and never changes the artifact, so one artifact can be shared
/// across threads and rendered any number of times.
#[derive(Debug)]
pub struct Artifact {
    program: Program,
    options: CompileOptions,
    origin: Arc<SourceOrigin>,
    dependencies: Vec<PathBuf>,
    assets: AssetDependencies,
}

/// Dependency metadata of an artifact, as consumed by bundlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub source_path: Option<PathBuf>,
    pub dependencies: Vec<PathBuf>,
    pub script_dependencies: Vec<DependencyDescriptor>,
    pub style_dependencies: Vec<DependencyDescriptor>,
    pub image_dependencies: Vec<DependencyDescriptor>,
}

impl Artifact {
    pub(crate) fn new(compiled: CompiledTemplate, options: CompileOptions) -> Self {
        let filename = options
            .source_path
            .as_deref()
            .map_or_else(|| ANONYMOUS_FILENAME.to_string(), |p| p.display().to_string());
        Self {
            program: compiled.program,
            origin: Arc::new(SourceOrigin {
                filename,
                text: compiled.text,
            }),
            options,
            dependencies: compiled.dependencies,
            assets: compiled.assets,
        }
    }

    /// Render with `data` as the data context.
    pub fn render(
        &self,
        data: &Value,
        evaluator: &dyn ExpressionEvaluator,
    ) -> TemplateResult<RenderOutput> {
        runtime::execute(&self.program, &self.origin, data, &self.options, evaluator)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.options.source_path.as_deref()
    }

    /// The template text after whitespace normalization.
    pub fn text(&self) -> &str {
        &self.origin.text
    }

    /// Resolved include, component and asset paths, in directive order.
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    pub fn assets(&self) -> &AssetDependencies {
        &self.assets
    }

    pub fn script_dependencies(&self) -> &[DependencyDescriptor] {
        &self.assets.scripts
    }

    pub fn style_dependencies(&self) -> &[DependencyDescriptor] {
        &self.assets.styles
    }

    pub fn image_dependencies(&self) -> &[DependencyDescriptor] {
        &self.assets.images
    }

    pub fn dependency_report(&self) -> DependencyReport {
        DependencyReport {
            source_path: self.options.source_path.clone(),
            dependencies: self.dependencies.clone(),
            script_dependencies: self.assets.scripts.clone(),
            style_dependencies: self.assets.styles.clone(),
            image_dependencies: self.assets.images.clone(),
        }
    }

    /// The generated function body: output buffer preamble, the locals
    /// wrapper, the program listing and the return statement. With
    /// diagnostics on, the body is wrapped in the rethrowing `try`.
    pub fn source(&self) -> String {
        let mut body = String::new();
        body.push_str("  var __output = [], __append = __output.push.bind(__output);\n");
        body.push_str("  var includeAtarray = [];\n");
        if self.options.strict_locals_scope {
            body.push_str("  with (locals || {}) {\n");
        }
        let _ = write!(body, "{}", self.program);
        if self.options.strict_locals_scope {
            body.push_str("  }\n");
        }
        body.push_str(
            "  return { output: __output.join(\"\"), extractedBlocks: includeAtarray };\n",
        );

        if !self.options.compile_diagnostics {
            return body;
        }

        let lines = serde_json::to_string(&*self.origin.text).unwrap_or_default();
        let filename = match &self.options.source_path {
            Some(path) => {
                serde_json::to_string(&path.display().to_string()).unwrap_or_default()
            }
            None => "undefined".to_string(),
        };
        format!(
            "var __line = 1\n  , __lines = {lines}\n  , __filename = {filename};\n\
             try {{\n{body}}} catch (e) {{\n  rethrow(e, __lines, __filename, __line);\n}}\n"
        )
    }
}
