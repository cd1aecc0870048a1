/*
 * compile.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Compile and prebuild command implementations
 */

//! `quarto-ejs compile` prints the generated function body of a template;
//! `quarto-ejs prebuild` prints build-tool code with directives dropped.

use std::path::Path;

use anyhow::{Context, Result};

use super::{GlobalArgs, Session, template_failure};

pub fn execute(global: &GlobalArgs, input: &Path) -> Result<()> {
    let session = Session::open(global, input)?;
    let artifact = session
        .compiler
        .compile_file(input, &session.options)
        .map_err(|err| template_failure(err, input))?;
    print!("{}", artifact.source());
    Ok(())
}

pub fn prebuild(global: &GlobalArgs, input: &Path) -> Result<()> {
    let session = Session::open(global, input)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read template {}", input.display()))?;
    let code = session
        .compiler
        .prebuild(&text, &session.options)
        .map_err(|err| template_failure(err, input))?;
    print!("{code}");
    Ok(())
}
