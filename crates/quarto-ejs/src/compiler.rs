/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compile and render entry points.
//!
//! A [`Compiler`] bundles the collaborators a compile needs (template loader,
//! component lookup, optional artifact cache, expression evaluator). Every
//! collaborator is injected; the defaults read from the filesystem, know no
//! components, cache nothing and evaluate with [`ScriptEvaluator`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::artifact::Artifact;
use crate::cache::ArtifactCache;
use crate::component::{ComponentLookup, ComponentRegistry};
use crate::error::{TemplateError, TemplateResult};
use crate::evaluator::ExpressionEvaluator;
use crate::loader::{FileSystemLoader, TemplateLoader, normalize_path};
use crate::options::CompileOptions;
use crate::runtime::RenderOutput;
use crate::script::ScriptEvaluator;
use crate::template::{Collaborators, Template};

#[derive(Clone)]
pub struct Compiler {
    loader: Arc<dyn TemplateLoader>,
    components: Arc<dyn ComponentLookup>,
    cache: Option<Arc<dyn ArtifactCache>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            loader: Arc::new(FileSystemLoader),
            components: Arc::new(ComponentRegistry::new()),
            cache: None,
            evaluator: Arc::new(ScriptEvaluator::new()),
        }
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn with_components(mut self, components: impl ComponentLookup + 'static) -> Self {
        self.components = Arc::new(components);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            loader: self.loader.as_ref(),
            components: self.components.as_ref(),
        }
    }

    /// Compile template text.
    ///
    /// The cache is not consulted; use [`Compiler::compile_file`] or
    /// [`Compiler::render`] for cached compiles.
    pub fn compile(&self, text: &str, options: &CompileOptions) -> TemplateResult<Artifact> {
        tracing::debug!(path = ?options.source_path, "Compiling template");
        let compiled = Template::new(text, options.clone(), self.collaborators()).compile()?;
        let artifact = Artifact::new(compiled, options.clone());
        if options.debug {
            tracing::debug!("Generated source:\n{}", artifact.source());
        }
        Ok(artifact)
    }

    /// Compile the template at `path`. `options.source_path` is replaced by
    /// `path`.
    pub fn compile_file(
        &self,
        path: impl AsRef<Path>,
        options: &CompileOptions,
    ) -> TemplateResult<Arc<Artifact>> {
        let path = normalize_path(path.as_ref());
        let options = options.clone().with_source_path(path.clone());
        self.cached(&options, || {
            self.loader
                .read_template_source(&path)
                .map_err(|source| TemplateError::SourceRead {
                    path: path.clone(),
                    source,
                })
        })
    }

    /// Compile and render template text.
    ///
    /// With `cache_artifacts`, the artifact is cached under
    /// `options.source_path`, which must then be set.
    pub fn render(
        &self,
        text: &str,
        data: &Value,
        options: &CompileOptions,
    ) -> TemplateResult<RenderOutput> {
        let artifact = if options.cache_artifacts {
            if options.source_path.is_none() {
                return Err(TemplateError::MissingFilename { operation: "cache" });
            }
            self.cached(options, || Ok(text.to_string()))?
        } else {
            Arc::new(self.compile(text, options)?)
        };
        artifact.render(data, self.evaluator.as_ref())
    }

    /// Compile (or fetch from the cache) and render the template at `path`.
    pub fn render_file(
        &self,
        path: impl AsRef<Path>,
        data: &Value,
        options: &CompileOptions,
    ) -> TemplateResult<RenderOutput> {
        self.compile_file(path, options)?
            .render(data, self.evaluator.as_ref())
    }

    /// Generated code text for build tools.
    ///
    /// Directives are dropped and diagnostics are off. The body collects its
    /// output in `tempContent` and reads data through `$TemplateData`.
    pub fn prebuild(&self, text: &str, options: &CompileOptions) -> TemplateResult<String> {
        let options = options.clone().with_compile_diagnostics(false);
        let compiled = Template::new(text, options, self.collaborators())
            .without_directives()
            .compile()?;
        Ok(format!(
            "  var tempContent = [], __append = function (n) {{ tempContent.push(n) }};\n\
             \x20 with ($TemplateData || {{}}) {{\n{}  }}\n\
             \x20 return tempContent.join('');\n",
            compiled.program
        ))
    }

    /// Drop every cached artifact.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.reset();
        }
    }

    fn cached(
        &self,
        options: &CompileOptions,
        read: impl FnOnce() -> TemplateResult<String>,
    ) -> TemplateResult<Arc<Artifact>> {
        let cache = match (&self.cache, &options.source_path) {
            (Some(cache), Some(path)) if options.cache_artifacts => Some((cache, path)),
            _ => None,
        };

        if let Some((cache, path)) = cache {
            if let Some(artifact) = cache.get(path) {
                tracing::debug!(path = %path.display(), "Artifact cache hit");
                return Ok(artifact);
            }
        }

        let artifact = Arc::new(self.compile(&read()?, options)?);
        if let Some((cache, path)) = cache {
            cache.set(path.clone(), Arc::clone(&artifact));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::loader::MemoryLoader;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_text() {
        let out = Compiler::new()
            .render(
                "Hi <%= name %>!",
                &json!({"name": "Sam"}),
                &CompileOptions::default(),
            )
            .unwrap();
        assert_eq!(out.output, "Hi Sam!");
        assert!(out.extracted_blocks.is_empty());
    }

    #[test]
    fn test_cached_render_requires_source_path() {
        let err = Compiler::new()
            .render(
                "x",
                &json!({}),
                &CompileOptions::default().with_cache_artifacts(true),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MissingFilename { operation: "cache" }
        ));
    }

    #[test]
    fn test_compile_file_uses_cache() {
        let cache = Arc::new(MemoryCache::new());
        let compiler = Compiler::new()
            .with_loader(MemoryLoader::with_templates([("/t/page.ejs", "<%= 1 + 1 %>")]))
            .with_cache(cache.clone());
        let options = CompileOptions::default().with_cache_artifacts(true);

        let first = compiler.compile_file("/t/page.ejs", &options).unwrap();
        let second = compiler.compile_file("/t/./page.ejs", &options).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        compiler.clear_cache();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compile_file_without_caching_recompiles() {
        let compiler = Compiler::new()
            .with_loader(MemoryLoader::with_templates([("/t/page.ejs", "x")]))
            .with_cache(Arc::new(MemoryCache::new()));
        let options = CompileOptions::default();
        let first = compiler.compile_file("/t/page.ejs", &options).unwrap();
        let second = compiler.compile_file("/t/page.ejs", &options).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_source_file() {
        let err = Compiler::new()
            .with_loader(MemoryLoader::new())
            .compile_file("/t/missing.ejs", &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, TemplateError::SourceRead { .. }));
    }

    #[test]
    fn test_prebuild_drops_directives() {
        let code = Compiler::new()
            .prebuild(
                "<% include header %><p><%= title %></p>",
                &CompileOptions::default(),
            )
            .unwrap();
        assert_eq!(
            code,
            "  var tempContent = [], __append = function (n) { tempContent.push(n) };\n\
             \x20 with ($TemplateData || {}) {\n\
             \x20   ; __append(\"<p>\")\n\
             \x20   ; __append(escape(title))\n\
             \x20   ; __append(\"</p>\")\n\
             \x20 }\n\
             \x20 return tempContent.join('');\n"
        );
    }

    #[test]
    fn test_custom_evaluator_is_used() {
        let compiler = Compiler::new().with_evaluator(
            ScriptEvaluator::new().with_function("shout", |args: &[Value]| {
                let text = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(text.to_uppercase()))
            }),
        );
        let out = compiler
            .render("<%= shout(word) %>", &json!({"word": "hey"}), &CompileOptions::default())
            .unwrap();
        assert_eq!(out.output, "HEY");
    }
}
