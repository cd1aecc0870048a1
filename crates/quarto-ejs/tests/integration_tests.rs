/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for quarto-ejs using test fixtures.
 */

use pretty_assertions::assert_eq;
use quarto_ejs::{
    CompileOptions, Compiler, ComponentRegistry, DirectoryComponent, EvalError, ExtractedBlock,
    MemoryCache, TemplateError,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Helper to get the path to test fixtures
fn fixture_path(name: &str) -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir).join("test-fixtures").join(name)
}

fn nav_component() -> DirectoryComponent {
    DirectoryComponent::new("nav", fixture_path("components/nav")).with_defaults("{active: 'none'}")
}

fn compiler_with_components() -> Compiler {
    let mut components = ComponentRegistry::new();
    components.register(nav_component());
    Compiler::new().with_components(components)
}

#[test]
fn test_hello() {
    let out = Compiler::new()
        .render_file(
            fixture_path("hello.ejs"),
            &json!({"name": "Sam"}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(out.output, "Hi Sam!");
    assert!(out.extracted_blocks.is_empty());

    let artifact = Compiler::new()
        .compile_file(fixture_path("hello.ejs"), &CompileOptions::default())
        .unwrap();
    assert!(artifact.dependencies().is_empty());
    assert!(artifact.assets().is_empty());
}

#[test]
fn test_tag_free_template_renders_itself() {
    let text = "<section>\n  <p>No tags here.</p>\n</section>\n";
    let compiler = Compiler::new();
    let artifact = compiler.compile(text, &CompileOptions::default()).unwrap();
    let out = artifact.render(&json!({}), compiler.evaluator()).unwrap();
    assert_eq!(out.output, text);
    assert!(artifact.script_dependencies().is_empty());
    assert!(artifact.style_dependencies().is_empty());
    assert!(artifact.image_dependencies().is_empty());
}

#[test]
fn test_trim_closer_drops_first_newline_of_next_text() {
    let out = Compiler::new()
        .render(
            "<% var a = 1 -%>foo\nbar\n<%= a %>",
            &json!({}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(out.output, "foobar\n1");
}

#[test]
fn test_escaped_and_raw_output() {
    let out = Compiler::new()
        .render(
            "<%= html %>|<%- html %>",
            &json!({"html": "<b>\"x\" & 'y'</b>"}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(
        out.output,
        "&lt;b&gt;&#34;x&#34; &amp; &#39;y&#39;&lt;/b&gt;|<b>\"x\" & 'y'</b>"
    );
}

#[test]
fn test_custom_escape_function() {
    fn shout(text: &str) -> String {
        text.to_uppercase()
    }
    let out = Compiler::new()
        .render(
            "<%= word %>",
            &json!({"word": "quiet"}),
            &CompileOptions::default().with_escape(shout),
        )
        .unwrap();
    assert_eq!(out.output, "QUIET");
}

#[test]
fn test_delimiter_does_not_change_program() {
    let percent = "a<%= x %>b<% if (y) { -%>\nc<%# note %><%- z %><% } %>d";
    let question = percent.replace('%', "?");

    let compiler = Compiler::new();
    let options = CompileOptions::default();
    let first = compiler.compile(percent, &options).unwrap();
    let second = compiler
        .compile(&question, &options.clone().with_delimiter('?'))
        .unwrap();
    assert_eq!(first.program(), second.program());
}

#[test]
fn test_loop_and_truncating_close() {
    let out = Compiler::new()
        .render_file(
            fixture_path("list.ejs"),
            &json!({"items": ["a", "<b>"]}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(out.output, "<ul>\n  <li>a</li>\n  <li>&lt;b&gt;</li>\n</ul>\n");
}

#[test]
fn test_duplicate_images_are_collected_once() {
    let options = CompileOptions::default().with_source_path("/site/index.ejs");
    let artifact = Compiler::new()
        .compile(
            "<img src=\"a.png\"><img src='a.png'><img data-src=\"b.png\">\
             <div style=\"background: url(c.png)\"></div><img src=\"https://cdn/x.png\">",
            &options,
        )
        .unwrap();
    let names: Vec<&str> = artifact
        .image_dependencies()
        .iter()
        .map(|d| d.resource_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    assert_eq!(
        artifact.image_dependencies()[0].resource_path,
        PathBuf::from("/site/a.png")
    );
}

#[test]
fn test_nested_include_output_and_dependencies() {
    let artifact = Compiler::new()
        .compile_file(fixture_path("page.ejs"), &CompileOptions::default())
        .unwrap();
    let out = artifact
        .render(
            &json!({"body": "Content", "year": 2025}),
            Compiler::new().evaluator(),
        )
        .unwrap();
    assert_eq!(
        out.output,
        "<header>Home</header><img src=\"logo.png\">\n<main>Content</main>\n<footer>2025</footer>"
    );

    assert_eq!(
        artifact.dependencies(),
        &[
            fixture_path("partials/header.ejs"),
            fixture_path("partials/footer.ejs"),
        ]
    );
    let images = artifact.image_dependencies();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].resource_name, "logo.png");
    assert_eq!(images[0].resource_path, fixture_path("partials/logo.png"));
}

#[test]
fn test_include_params_are_isolated() {
    // With params, the caller's `title` is hidden from the include
    let err = Compiler::new()
        .render(
            "<% include partials/header {other: 1} %>",
            &json!({"title": "Outer"}),
            &CompileOptions::default().with_source_path(fixture_path("page.ejs")),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TemplateError::RuntimeEvaluation {
            source: EvalError::UndefinedName { ref name },
            ..
        } if name == "title"
    ));
}

#[test]
fn test_block_extraction() {
    let out = Compiler::new()
        .render_file(
            fixture_path("extract.ejs"),
            &json!({}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert_eq!(out.output, "<p>main</p><p>after</p>");
    assert_eq!(
        out.extracted_blocks,
        vec![ExtractedBlock {
            html: "<style>x</style>".to_string(),
            params: json!({"slot": "head"}),
        }]
    );

    let serialized = serde_json::to_value(&out).unwrap();
    assert_eq!(
        serialized["extractedBlocks"][0]["params"],
        json!({"slot": "head"})
    );
}

#[test]
fn test_malformed_tag_fails_before_output() {
    let err = Compiler::new()
        .compile_file(fixture_path("malformed.ejs"), &CompileOptions::default())
        .unwrap_err();
    match err {
        TemplateError::MalformedTag { tag, line, offset, .. } => {
            assert_eq!(tag, "<%=");
            assert_eq!(line, 2);
            assert_eq!(offset, 3);
        }
        other => panic!("expected MalformedTag, got {other}"),
    }
}

#[test]
fn test_malformed_tag_in_include_names_the_included_file() {
    let err = Compiler::new()
        .compile_file(fixture_path("unclosed-include.ejs"), &CompileOptions::default())
        .unwrap_err();
    match err {
        TemplateError::MalformedTag {
            line,
            offset,
            path,
            source_text,
            ..
        } => {
            assert_eq!(line, 2);
            assert!(path.unwrap().ends_with("partials/unclosed.ejs"));
            assert_eq!(&source_text[offset..], "<%= oops");
        }
        other => panic!("expected MalformedTag, got {other}"),
    }
}

#[test]
fn test_malformed_tag_offset_follows_trimmed_text() {
    let options = CompileOptions::default().with_trim_whitespace(true);
    let err = Compiler::new()
        .compile("   <p>
   <%= x", &options)
        .unwrap_err();
    match err {
        TemplateError::MalformedTag {
            offset, source_text, ..
        } => assert_eq!(&source_text[offset..], "<%= x"),
        other => panic!("expected MalformedTag, got {other}"),
    }
}

#[test]
fn test_cyclic_include() {
    let err = Compiler::new()
        .compile_file(fixture_path("cycle-a.ejs"), &CompileOptions::default())
        .unwrap_err();
    match err {
        TemplateError::CyclicInclude { path, chain } => {
            assert_eq!(path, fixture_path("cycle-a.ejs"));
            assert_eq!(chain.len(), 3);
        }
        other => panic!("expected CyclicInclude, got {other}"),
    }
}

#[test]
fn test_runtime_error_context() {
    let path = fixture_path("runtime-error.ejs");
    let err = Compiler::new()
        .render_file(&path, &json!({}), &CompileOptions::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!(
            "{}:3\n    1| a\n    2| b\n >> 3| <%= missing.name %>\n    4| c\n\nmissing is not defined",
            path.display()
        )
    );
}

#[test]
fn test_runtime_error_context_follows_include() {
    let err = Compiler::new()
        .render_file(
            fixture_path("broken-page.ejs"),
            &json!({}),
            &CompileOptions::default(),
        )
        .unwrap_err();
    match err {
        TemplateError::RuntimeEvaluation {
            filename, line, ..
        } => {
            assert_eq!(filename, fixture_path("partials/broken.ejs").display().to_string());
            assert_eq!(line, 2);
        }
        other => panic!("expected RuntimeEvaluation, got {other}"),
    }
}

#[test]
fn test_runtime_error_without_diagnostics() {
    let err = Compiler::new()
        .render(
            "<%= missing %>",
            &json!({}),
            &CompileOptions::default().with_compile_diagnostics(false),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Evaluation(EvalError::UndefinedName { .. })
    ));
}

#[test]
fn test_component_include() {
    let compiler = compiler_with_components();
    let artifact = compiler
        .compile_file(fixture_path("with-component.ejs"), &CompileOptions::default())
        .unwrap();
    let out = artifact.render(&json!({}), compiler.evaluator()).unwrap();

    let nav_js = fixture_path("components/nav/nav.js");
    let nav_css = fixture_path("components/nav/nav.css");
    assert_eq!(
        out.output,
        format!(
            "\r\n <!--module begin:nav--><nav><% referjs {}%><% refercss {}%>home</nav>\r\n <!--module end:nav-->",
            nav_js.display(),
            nav_css.display()
        )
    );

    let scripts = artifact.script_dependencies();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].component.as_deref(), Some("nav"));
    assert_eq!(scripts[0].resource_name, "nav.js");
    assert_eq!(scripts[0].resource_path, nav_js);
    assert_eq!(artifact.style_dependencies()[0].resource_path, nav_css);

    // The missing component is skipped, not an error
    assert_eq!(
        artifact.dependencies(),
        &[nav_js, nav_css, fixture_path("components/nav/index.ejs")]
    );
}

#[test]
fn test_component_defaults_without_params() {
    let out = compiler_with_components()
        .render_file(
            fixture_path("component-defaults.ejs"),
            &json!({}),
            &CompileOptions::default(),
        )
        .unwrap();
    assert!(out.output.contains("none</nav>"));
}

#[test]
fn test_markers_round_trip_through_bundler_pass() {
    let compiler = compiler_with_components();
    let out = compiler
        .render_file(
            fixture_path("with-component.ejs"),
            &json!({}),
            &CompileOptions::default(),
        )
        .unwrap();

    let scanned = quarto_ejs::markers::scan_asset_markers(&out.output);
    let (stripped, markers) =
        quarto_ejs::markers::strip_asset_directives(&out.output, '%').unwrap();
    assert_eq!(scanned, markers);
    assert_eq!(markers.scripts.len(), 1);
    assert_eq!(
        stripped,
        "\r\n <!--module begin:nav--><nav>home</nav>\r\n <!--module end:nav-->"
    );
}

#[test]
fn test_cache_serves_stale_artifact_until_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.ejs");
    std::fs::write(&path, "v1 <%= n %>").unwrap();

    let cache = Arc::new(MemoryCache::new());
    let compiler = Compiler::new().with_cache(cache.clone());
    let options = CompileOptions::default().with_cache_artifacts(true);
    let data = json!({"n": 1});

    let first = compiler.render_file(&path, &data, &options).unwrap();
    assert_eq!(first.output, "v1 1");

    std::fs::write(&path, "v2 <%= n %>").unwrap();
    let cached = compiler.render_file(&path, &data, &options).unwrap();
    assert_eq!(cached.output, "v1 1");

    compiler.clear_cache();
    let fresh = compiler.render_file(&path, &data, &options).unwrap();
    assert_eq!(fresh.output, "v2 1");
}

#[test]
fn test_artifact_is_shareable_across_threads() {
    let compiler = Compiler::new();
    let artifact = Arc::new(
        compiler
            .compile("<%= n * 2 %>", &CompileOptions::default())
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let artifact = Arc::clone(&artifact);
            let compiler = compiler.clone();
            std::thread::spawn(move || {
                artifact
                    .render(&json!({ "n": n }), compiler.evaluator())
                    .unwrap()
                    .output
            })
        })
        .collect();
    let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outputs, vec!["0", "2", "4", "6"]);
}

#[test]
fn test_trim_whitespace() {
    let out = Compiler::new()
        .render(
            "  <ul>\r\n    <li><%= x %></li>   \r\n  </ul>\r\n",
            &json!({"x": 1}),
            &CompileOptions::default().with_trim_whitespace(true),
        )
        .unwrap();
    assert_eq!(out.output, "<ul>\n<li>1</li>\n</ul>");
}

#[test]
fn test_literal_delimiter() {
    let out = Compiler::new()
        .render("<%% not a tag %>", &json!({}), &CompileOptions::default())
        .unwrap();
    assert_eq!(out.output, "<% not a tag %>");
}

#[test]
fn test_prebuild_output() {
    let code = Compiler::new()
        .prebuild("<p><%= title %></p>", &CompileOptions::default())
        .unwrap();
    assert!(code.contains("__append(escape(title))"));
    assert!(code.contains("return tempContent.join('');"));
    assert!(!code.contains("__line"));
}
