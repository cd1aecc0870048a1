/*
 * deps.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Dependency and marker command implementations
 */

//! Bundler-facing commands.
//!
//! `quarto-ejs deps` prints the dependency metadata of a template without
//! rendering it. `quarto-ejs markers` lists (and optionally strips) the
//! `referjs` / `refercss` markers in rendered output.

use std::path::Path;

use anyhow::{Context, Result};
use quarto_ejs::markers::{scan_asset_markers, strip_asset_directives};
use serde::Serialize;

use super::{GlobalArgs, Session, template_failure};

pub fn execute(global: &GlobalArgs, input: &Path) -> Result<()> {
    let session = Session::open(global, input)?;
    let artifact = session
        .compiler
        .compile_file(input, &session.options)
        .map_err(|err| template_failure(err, input))?;
    println!("{}", serde_json::to_string_pretty(&artifact.dependency_report())?);
    Ok(())
}

#[derive(Serialize)]
struct StrippedMarkers {
    text: String,
    scripts: Vec<String>,
    styles: Vec<String>,
}

pub fn markers(global: &GlobalArgs, input: &Path, strip: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    if !strip {
        println!("{}", serde_json::to_string_pretty(&scan_asset_markers(&text))?);
        return Ok(());
    }

    let delimiter = global.delimiter.unwrap_or('%');
    let (text, markers) =
        strip_asset_directives(&text, delimiter).map_err(|err| template_failure(err, input))?;
    let result = StrippedMarkers {
        text,
        scripts: markers.scripts,
        styles: markers.styles,
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
