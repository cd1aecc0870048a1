/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! EJS template compiler for Quarto.
//!
//! Compiles text with embedded `<% %>` tags into a reusable [`Artifact`].
//! Rendering an artifact with a data context yields the output string plus
//! any blocks diverted with `includeAt` / `endAt`; the artifact also carries
//! the script, style and image assets referenced by the template and
//! everything it includes.
//!
//! Supported tags:
//!
//! - `<% code %>` / `<%_ code %>`: statements
//! - `<%= expr %>`: escaped output
//! - `<%- expr %>`: raw output
//! - `<%# comment %>`: discarded
//! - `<%%`: a literal `<%`
//! - `%>`, `-%>` (trims the following newline), `_%>` (slurps whitespace)
//!
//! Directives, written as the whole content of an evaluate tag:
//!
//! - `include path [params]`: splice another template
//! - `includeModule name [params]`: splice a component's main template
//! - `includeJs ref` / `includeCss ref`: record an asset, leave a marker
//! - `includeAt params` ... `endAt`: divert output into an extracted block
//!
//! # Architecture
//!
//! The compiler never interprets embedded code. Fragments are forwarded into
//! the generated [`Program`] and evaluated at render time by an
//! [`ExpressionEvaluator`]; [`ScriptEvaluator`] is the built-in one, covering
//! a JavaScript-like subset.
//!
//! # Example
//!
//! ```
//! use quarto_ejs::{CompileOptions, Compiler};
//! use serde_json::json;
//!
//! let compiler = Compiler::new();
//! let out = compiler
//!     .render("Hi <%= name %>!", &json!({"name": "Sam"}), &CompileOptions::default())
//!     .unwrap();
//! assert_eq!(out.output, "Hi Sam!");
//! ```

pub mod artifact;
pub mod cache;
pub mod collector;
pub mod compiler;
pub mod component;
pub mod diagnostics;
pub mod directive;
pub mod error;
pub mod escape;
pub mod evaluator;
pub mod loader;
pub mod markers;
pub mod mode;
pub mod options;
pub mod program;
pub mod runtime;
pub mod script;
mod template;
pub mod tokenizer;

// Re-export main types at crate root
pub use artifact::{Artifact, DependencyReport};
pub use cache::{ArtifactCache, LruArtifactCache, MemoryCache};
pub use collector::{AssetDependencies, DependencyDescriptor};
pub use compiler::Compiler;
pub use component::{Component, ComponentLookup, ComponentRegistry, DirectoryComponent};
pub use directive::Directive;
pub use error::{EvalError, TemplateError, TemplateResult};
pub use evaluator::{ExpressionEvaluator, Scope};
pub use loader::{FileSystemLoader, MemoryLoader, TemplateLoader};
pub use options::CompileOptions;
pub use program::{Instruction, Program};
pub use runtime::{ExtractedBlock, RenderOutput};
pub use script::ScriptEvaluator;
