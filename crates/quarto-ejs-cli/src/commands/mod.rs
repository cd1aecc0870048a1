/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Command implementations
 */

pub mod compile;
pub mod deps;
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::Result;
use quarto_ejs::{CompileOptions, Compiler, TemplateError};

use crate::config::ProjectConfig;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub delimiter: Option<char>,
    pub trim_whitespace: bool,
    pub no_compile_diagnostics: bool,
    pub debug: bool,
}

/// A compiler and options prepared for one template file.
pub struct Session {
    pub compiler: Compiler,
    pub options: CompileOptions,
}

impl Session {
    /// Read project configuration for `template` and apply command line
    /// overrides.
    pub fn open(global: &GlobalArgs, template: &Path) -> Result<Self> {
        let config = ProjectConfig::discover(global.config.as_deref(), template)?;
        let compiler = Compiler::new().with_components(config.registry());

        let mut options = config.options;
        if let Some(delimiter) = global.delimiter {
            options.delimiter = delimiter;
        }
        if global.trim_whitespace {
            options.trim_whitespace = true;
        }
        if global.no_compile_diagnostics {
            options.compile_diagnostics = false;
        }
        if global.debug {
            options.debug = true;
        }
        options.source_path = Some(template.to_path_buf());

        Ok(Self { compiler, options })
    }
}

/// Convert a library error for `anyhow`. Malformed tags are reported with
/// source context and end the process directly.
pub fn template_failure(err: TemplateError, path: &Path) -> anyhow::Error {
    if let TemplateError::MalformedTag {
        path: tag_path,
        source_text,
        ..
    } = &err
    {
        let path = tag_path.as_deref().unwrap_or(path);
        eprint!("{}", malformed_tag_report(&err, path, source_text));
        std::process::exit(1);
    }
    anyhow::Error::new(err)
}

/// Render an ariadne report pointing at an unterminated tag. `text` is the
/// normalized template text the error's offset refers to.
pub fn malformed_tag_report(err: &TemplateError, path: &Path, text: &str) -> String {
    use ariadne::{Color, Config, Label, Report, ReportKind, Source};

    let (offset, tag_len) = match err {
        TemplateError::MalformedTag { offset, tag, .. } => (*offset, tag.chars().count()),
        _ => (0, 1),
    };

    // ariadne spans count chars, not bytes
    let offset = offset.min(text.len());
    let start = text
        .get(..offset)
        .map_or(0, |prefix| prefix.chars().count());
    let end = (start + tag_len).min(text.chars().count()).max(start);

    let id = path.display().to_string();
    let report = Report::build(ReportKind::Error, id.clone(), start)
        .with_config(Config::default().with_color(false))
        .with_message(err.to_string())
        .with_label(
            Label::new((id.clone(), start..end))
                .with_message("this tag is never closed")
                .with_color(Color::Red),
        )
        .finish();

    let mut output = Vec::new();
    if report
        .write((id, Source::from(text)), &mut output)
        .is_err()
    {
        return format!("{err}\n");
    }
    String::from_utf8_lossy(&output).into_owned()
}
