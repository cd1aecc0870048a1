/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-compile template state.
//!
//! A [`Template`] is created for every compile request, including once per
//! nested include. Its pass normalizes whitespace, collects image
//! dependencies, then walks the segments: directives are rewritten here,
//! everything else goes through the [`ModeMachine`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::collector::{AssetDependencies, AssetKind, DependencyCollector};
use crate::component::{Component, ComponentLookup};
use crate::directive::Directive;
use crate::error::{TemplateError, TemplateResult};
use crate::loader::{TemplateLoader, normalize_path};
use crate::mode::ModeMachine;
use crate::options::CompileOptions;
use crate::program::{Instruction, Program, ScopeEntry, SourceOrigin};
use crate::tokenizer::{Segment, TagKind, Tokenizer};

static LINE_EDGE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s+|\s+$").expect("valid regex"));

/// Services a compile pass reads through.
#[derive(Clone, Copy)]
pub(crate) struct Collaborators<'c> {
    pub loader: &'c dyn TemplateLoader,
    pub components: &'c dyn ComponentLookup,
}

/// Output of a compile pass.
#[derive(Debug)]
pub(crate) struct CompiledTemplate {
    pub program: Program,
    /// The normalized text the program was generated from.
    pub text: Arc<str>,
    /// Resolved include and resource paths, in directive order.
    pub dependencies: Vec<PathBuf>,
    pub assets: AssetDependencies,
}

pub(crate) struct Template<'c> {
    text: Arc<str>,
    options: CompileOptions,
    collaborators: Collaborators<'c>,
    /// Owning component of the template, if compiled through one.
    component: Option<Arc<dyn Component>>,
    /// Paths of the templates currently being compiled, outermost first.
    include_chain: Vec<PathBuf>,
    /// Prebuild passes drop directives instead of expanding them.
    expand_directives: bool,
}

/// Mutable state of one pass.
struct Pass {
    program: Program,
    machine: ModeMachine,
    collector: DependencyCollector,
    dependencies: Vec<PathBuf>,
}

impl<'c> Template<'c> {
    pub fn new(text: &str, options: CompileOptions, collaborators: Collaborators<'c>) -> Self {
        let text = normalize_whitespace(text, &options);
        let include_chain = options
            .source_path
            .as_deref()
            .map(normalize_path)
            .into_iter()
            .collect();
        Self {
            text: Arc::from(text),
            options,
            collaborators,
            component: None,
            include_chain,
            expand_directives: true,
        }
    }

    pub fn with_component(mut self, component: Option<Arc<dyn Component>>) -> Self {
        self.component = component;
        self
    }

    /// Continue an include chain. The template's own path is appended.
    fn with_parent_chain(mut self, parent: &[PathBuf]) -> Self {
        let own = std::mem::take(&mut self.include_chain);
        self.include_chain = parent.iter().cloned().chain(own).collect();
        self
    }

    pub fn without_directives(mut self) -> Self {
        self.expand_directives = false;
        self
    }

    /// Run the pass and produce the program and dependency lists.
    pub fn compile(self) -> TemplateResult<CompiledTemplate> {
        let tokenizer = Tokenizer::new(self.options.delimiter)?;
        let text: &str = &self.text;

        let mut pass = Pass {
            program: Program::new(),
            machine: ModeMachine::new(&self.options),
            collector: DependencyCollector::new(
                self.component.clone(),
                self.options.source_path.as_deref(),
            ),
            dependencies: Vec::new(),
        };
        if self.expand_directives {
            pass.collector.scan_images(text);
        }

        let segments: Vec<Segment<'_>> = tokenizer.tokenize(text).collect();
        tracing::trace!(
            segments = segments.len(),
            path = ?self.options.source_path,
            "Tokenized template"
        );

        for (index, segment) in segments.iter().enumerate() {
            if let Some(tag) = segment.tag {
                let closed = segments
                    .get(index + 2)
                    .and_then(|s| s.tag)
                    .is_some_and(TagKind::is_closer);
                if tag.is_opener() && !closed {
                    return Err(TemplateError::MalformedTag {
                        tag: segment.text.to_string(),
                        line: line_at(text, segment.offset),
                        offset: segment.offset,
                        path: self.options.source_path.clone(),
                        source_text: Arc::clone(&self.text),
                    });
                }
            }

            let opened_by = index
                .checked_sub(1)
                .and_then(|previous| segments[previous].tag);
            let directive = match opened_by {
                Some(tag) if segment.is_literal() && tag.accepts_directive() => {
                    Directive::parse(segment.text)
                }
                _ => None,
            };

            match directive {
                Some(directive) => {
                    self.apply(directive, &mut pass)?;
                    pass.machine
                        .advance_lines(segment.newline_count(), &mut pass.program);
                }
                None => pass.machine.scan(segment, &mut pass.program),
            }
        }

        Ok(CompiledTemplate {
            program: pass.program,
            text: Arc::clone(&self.text),
            dependencies: pass.dependencies,
            assets: pass.collector.finish(),
        })
    }

    fn apply(&self, directive: Directive, pass: &mut Pass) -> TemplateResult<()> {
        if !self.expand_directives {
            tracing::debug!(directive = directive.keyword(), "Dropping directive");
            return Ok(());
        }

        match directive {
            Directive::FileInclude { path, params } => self.include_file(&path, params, pass),
            Directive::ComponentInclude { name, params } => {
                self.include_component(&name, params, pass)
            }
            Directive::ScriptRef(reference) => {
                self.reference_asset(AssetKind::Script, &reference, pass);
                Ok(())
            }
            Directive::StyleRef(reference) => {
                self.reference_asset(AssetKind::Style, &reference, pass);
                Ok(())
            }
            Directive::BeginExtract { params } => {
                pass.program.push(Instruction::BeginCapture { params });
                Ok(())
            }
            Directive::EndExtract => {
                pass.program.push(Instruction::EndCapture);
                Ok(())
            }
        }
    }

    /// `include path [params]`
    fn include_file(
        &self,
        reference: &str,
        params: Option<String>,
        pass: &mut Pass,
    ) -> TemplateResult<()> {
        let Some(current) = self.options.source_path.as_deref() else {
            return Err(TemplateError::MissingFilename {
                operation: "include",
            });
        };
        let resolved = self
            .collaborators
            .loader
            .resolve_include_path(reference, current);
        tracing::debug!(
            reference,
            resolved = %resolved.display(),
            "Resolved include"
        );

        let nested = self.compile_nested(&resolved, None)?;

        let isolated = params.is_some();
        self.splice(
            nested,
            ScopeEntry {
                params: params.into_iter().collect(),
                isolated,
                origin: None,
            },
            &resolved,
            pass,
        );
        pass.dependencies.push(resolved);
        Ok(())
    }

    /// `includeModule name [params]`
    fn include_component(
        &self,
        name: &str,
        params: Option<String>,
        pass: &mut Pass,
    ) -> TemplateResult<()> {
        let component = match self.collaborators.components.lookup(name) {
            Ok(component) => component,
            Err(err) if err.is_recoverable() => {
                tracing::warn!(component = name, "{err}; skipping includeModule");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let main = component.main_template_path();
        tracing::debug!(
            component = name,
            main = %main.display(),
            "Including component"
        );
        let nested = self.compile_nested(&main, Some(Arc::clone(&component)))?;

        let isolated = params.is_some();
        let scope_params = component
            .default_params()
            .into_iter()
            .chain(params)
            .collect();

        pass.program.push(Instruction::Append(format!(
            "\r\n <!--module begin:{}-->",
            component.name()
        )));
        self.splice(
            nested,
            ScopeEntry {
                params: scope_params,
                isolated,
                origin: None,
            },
            &main,
            pass,
        );
        pass.program.push(Instruction::Append(format!(
            "\r\n <!--module end:{}-->",
            component.name()
        )));
        pass.dependencies.push(main);
        Ok(())
    }

    fn compile_nested(
        &self,
        path: &Path,
        component: Option<Arc<dyn Component>>,
    ) -> TemplateResult<CompiledTemplate> {
        if self.include_chain.iter().any(|active| active == path) {
            let mut chain = self.include_chain.clone();
            chain.push(path.to_path_buf());
            return Err(TemplateError::CyclicInclude {
                path: path.to_path_buf(),
                chain,
            });
        }

        let text = self
            .collaborators
            .loader
            .read_template_source(path)
            .map_err(|source| TemplateError::IncludeRead {
                path: path.to_path_buf(),
                source,
            })?;

        // File includes inherit the owning component
        let component = component.or_else(|| self.component.clone());
        let mut nested = Template::new(
            &text,
            self.options.for_include(path.to_path_buf()),
            self.collaborators,
        )
        .with_component(component)
        .with_parent_chain(&self.include_chain);
        nested.expand_directives = self.expand_directives;
        nested.compile()
    }

    /// Append a nested template's program inside a scope, and merge its
    /// dependencies.
    fn splice(
        &self,
        nested: CompiledTemplate,
        mut entry: ScopeEntry,
        path: &Path,
        pass: &mut Pass,
    ) {
        entry.origin = Some(Arc::new(SourceOrigin {
            filename: path.display().to_string(),
            text: nested.text,
        }));
        pass.program.push(Instruction::EnterScope(entry));
        pass.program.extend(nested.program);
        pass.program.push(Instruction::ExitScope);
        pass.collector.merge(nested.assets);
        pass.dependencies.extend(nested.dependencies);
    }

    /// `includeJs ref` / `includeCss ref`
    fn reference_asset(&self, kind: AssetKind, reference: &str, pass: &mut Pass) {
        let resource_path = pass.collector.reference(kind, reference);
        let marker = format!(
            "{open} {keyword} {path}{close}",
            open = TagKind::Open.text('%'),
            keyword = kind.marker(),
            path = resource_path.display(),
            close = TagKind::Close.text('%'),
        );
        pass.program.push(Instruction::Append(marker));
        pass.dependencies.push(resource_path);
    }
}

/// Apply `trim_whitespace` and the `<%_` / `_%>` slurping rules.
fn normalize_whitespace(text: &str, options: &CompileOptions) -> String {
    let mut text = text.to_string();
    if options.trim_whitespace {
        text = text.replace('\r', "");
        text = LINE_EDGE_WHITESPACE.replace_all(&text, "").into_owned();
    }

    let open_slurp = TagKind::OpenSlurp.text(options.delimiter);
    let close_slurp = TagKind::CloseSlurp.text(options.delimiter);
    if text.contains(&open_slurp) || text.contains(&close_slurp) {
        // The delimiter is validated by the tokenizer; an unusable one
        // leaves the text alone here and fails there.
        if let Ok(before) = Regex::new(&format!("[ \\t]*{}", regex::escape(&open_slurp))) {
            text = before.replace_all(&text, open_slurp.as_str()).into_owned();
        }
        if let Ok(after) = Regex::new(&format!("{}[ \\t]*", regex::escape(&close_slurp))) {
            text = after.replace_all(&text, close_slurp.as_str()).into_owned();
        }
    }
    text
}

/// 1-based line of a byte offset.
fn line_at(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentRegistry, DirectoryComponent};
    use crate::loader::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn compile_with(
        text: &str,
        options: CompileOptions,
        loader: &MemoryLoader,
        components: &ComponentRegistry,
    ) -> TemplateResult<CompiledTemplate> {
        let collaborators = Collaborators { loader, components };
        Template::new(text, options, collaborators).compile()
    }

    fn compile(text: &str) -> TemplateResult<CompiledTemplate> {
        compile_with(
            text,
            CompileOptions::default().with_compile_diagnostics(false),
            &MemoryLoader::new(),
            &ComponentRegistry::new(),
        )
    }

    fn append(text: &str) -> Instruction {
        Instruction::Append(text.to_string())
    }

    #[test]
    fn test_tag_free_text_is_one_append() {
        let compiled = compile("<p>plain</p>").unwrap();
        assert_eq!(compiled.program.instructions(), &[append("<p>plain</p>")]);
        assert!(compiled.dependencies.is_empty());
        assert!(compiled.assets.is_empty());
    }

    #[test]
    fn test_unterminated_tag_reports_line_and_offset() {
        let err = compile("a\nb <%= name").unwrap_err();
        match err {
            TemplateError::MalformedTag {
                tag,
                line,
                offset,
                source_text,
                ..
            } => {
                assert_eq!(tag, "<%=");
                assert_eq!(line, 2);
                assert_eq!(offset, 4);
                assert_eq!(&source_text[offset..], "<%= name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_slurp_tags_remove_horizontal_whitespace() {
        let compiled = compile("a  \t<%_ x _%>  \nb").unwrap();
        assert_eq!(
            compiled.program.instructions(),
            &[
                append("a"),
                Instruction::Exec(" x ".to_string()),
                append("b"),
            ]
        );
    }

    #[test]
    fn test_trim_whitespace_normalizes_lines() {
        let options = CompileOptions::default()
            .with_compile_diagnostics(false)
            .with_trim_whitespace(true);
        let compiled = compile_with(
            "  <ul>\r\n    <li>x</li>  \r\n  </ul>",
            options,
            &MemoryLoader::new(),
            &ComponentRegistry::new(),
        )
        .unwrap();
        assert_eq!(&*compiled.text, "<ul>\n<li>x</li>\n</ul>");
    }

    #[test]
    fn test_include_requires_source_path() {
        let err = compile("<% include header %>").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::MissingFilename {
                operation: "include"
            }
        ));
    }

    #[test]
    fn test_include_splices_nested_program() {
        let loader = MemoryLoader::with_templates([("/site/header.ejs", "<h1>Title</h1>")]);
        let options = CompileOptions::default()
            .with_compile_diagnostics(false)
            .with_source_path("/site/index.ejs");
        let compiled = compile_with(
            "<% include header %>body",
            options,
            &loader,
            &ComponentRegistry::new(),
        )
        .unwrap();

        let instructions = compiled.program.instructions();
        assert!(matches!(
            &instructions[0],
            Instruction::EnterScope(ScopeEntry { isolated: false, params, origin: Some(origin) })
                if params.is_empty() && origin.filename == "/site/header.ejs"
        ));
        assert_eq!(instructions[1], append("<h1>Title</h1>"));
        assert_eq!(instructions[2], Instruction::ExitScope);
        assert_eq!(instructions[3], append("body"));
        assert_eq!(compiled.dependencies, vec![PathBuf::from("/site/header.ejs")]);
    }

    #[test]
    fn test_include_with_params_is_isolated() {
        let loader = MemoryLoader::with_templates([("/site/card.ejs", "<%= title %>")]);
        let options = CompileOptions::default().with_source_path("/site/index.ejs");
        let compiled = compile_with(
            "<% include card {title: 'Hi'} %>",
            options,
            &loader,
            &ComponentRegistry::new(),
        )
        .unwrap();
        assert!(matches!(
            &compiled.program.instructions()[0],
            Instruction::EnterScope(ScopeEntry { isolated: true, params, .. })
                if params == &vec!["{title: 'Hi'}".to_string()]
        ));
    }

    #[test]
    fn test_missing_include_is_a_read_error() {
        let options = CompileOptions::default().with_source_path("/site/index.ejs");
        let err = compile_with(
            "<% include nowhere %>",
            options,
            &MemoryLoader::new(),
            &ComponentRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::IncludeRead { ref path, .. } if path == Path::new("/site/nowhere.ejs")
        ));
    }

    #[test]
    fn test_cyclic_include() {
        let loader = MemoryLoader::with_templates([
            ("/t/a.ejs", "<% include b %>"),
            ("/t/b.ejs", "<% include a %>"),
        ]);
        let options = CompileOptions::default().with_source_path("/t/a.ejs");
        let err = compile_with(
            "<% include b %>",
            options,
            &loader,
            &ComponentRegistry::new(),
        )
        .unwrap_err();
        match err {
            TemplateError::CyclicInclude { path, chain } => {
                assert_eq!(path, PathBuf::from("/t/a.ejs"));
                assert_eq!(
                    chain,
                    vec![
                        PathBuf::from("/t/a.ejs"),
                        PathBuf::from("/t/b.ejs"),
                        PathBuf::from("/t/a.ejs"),
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_component_is_skipped() {
        let compiled = compile("a<% includeModule nav %>b").unwrap();
        assert_eq!(compiled.program.instructions(), &[append("a"), append("b")]);
    }

    #[test]
    fn test_component_include_markers_and_defaults() {
        let loader = MemoryLoader::with_templates([(
            "/c/nav/index.ejs",
            "<% includeJs nav.js %><img src=\"logo.png\">",
        )]);
        let mut components = ComponentRegistry::new();
        components.register(DirectoryComponent::new("nav", "/c/nav").with_defaults("{depth: 1}"));

        let compiled = compile_with(
            "<% includeModule nav {active: 'home'} %>",
            CompileOptions::default().with_compile_diagnostics(false),
            &loader,
            &components,
        )
        .unwrap();

        let instructions = compiled.program.instructions();
        assert_eq!(instructions[0], append("\r\n <!--module begin:nav-->"));
        assert!(matches!(
            &instructions[1],
            Instruction::EnterScope(ScopeEntry { isolated: true, params, .. })
                if params == &vec!["{depth: 1}".to_string(), "{active: 'home'}".to_string()]
        ));
        assert_eq!(instructions[2], append("<% referjs /c/nav/nav.js%>"));
        assert_eq!(
            instructions.last(),
            Some(&append("\r\n <!--module end:nav-->"))
        );

        assert_eq!(compiled.assets.scripts[0].component.as_deref(), Some("nav"));
        assert_eq!(
            compiled.assets.images[0].resource_path,
            PathBuf::from("/c/nav/logo.png")
        );
        assert_eq!(
            compiled.dependencies,
            vec![
                PathBuf::from("/c/nav/nav.js"),
                PathBuf::from("/c/nav/index.ejs"),
            ]
        );
    }

    #[test]
    fn test_asset_marker_ignores_custom_delimiter() {
        let options = CompileOptions::default()
            .with_compile_diagnostics(false)
            .with_delimiter('?')
            .with_source_path("/site/index.ejs");
        let compiled = compile_with(
            "<? includeCss site.css ?>",
            options,
            &MemoryLoader::new(),
            &ComponentRegistry::new(),
        )
        .unwrap();
        assert_eq!(
            compiled.program.instructions(),
            &[append("<% refercss /site/site.css%>")]
        );
        assert_eq!(compiled.assets.styles[0].resource_name, "site.css");
    }

    #[test]
    fn test_extraction_directives() {
        let compiled = compile("<% includeAt {\n\tx: 1\n} %>in<% endAt %>").unwrap();
        assert_eq!(
            compiled.program.instructions(),
            &[
                Instruction::BeginCapture {
                    params: "{x: 1}".to_string()
                },
                append("in"),
                Instruction::EndCapture,
            ]
        );
    }

    #[test]
    fn test_directive_lines_are_counted() {
        let options = CompileOptions::default();
        let compiled = compile_with(
            "<% includeAt {x: 1}\n%>a<% endAt %>",
            options,
            &MemoryLoader::new(),
            &ComponentRegistry::new(),
        )
        .unwrap();
        assert!(compiled.program.instructions().contains(&Instruction::Line(2)));
    }

    #[test]
    fn test_directives_are_dropped_without_expansion() {
        let collaborators = Collaborators {
            loader: &MemoryLoader::new(),
            components: &ComponentRegistry::new(),
        };
        let compiled = Template::new(
            "a<% include header %><% includeJs x.js %>b",
            CompileOptions::default().with_compile_diagnostics(false),
            collaborators,
        )
        .without_directives()
        .compile()
        .unwrap();
        assert_eq!(compiled.program.instructions(), &[append("a"), append("b")]);
        assert!(compiled.assets.is_empty());
    }

    #[test]
    fn test_escaped_output_tag_is_not_a_directive() {
        let compiled = compile("<%= include %>").unwrap();
        assert_eq!(
            compiled.program.instructions(),
            &[Instruction::AppendEscaped("include".to_string())]
        );
    }
}
