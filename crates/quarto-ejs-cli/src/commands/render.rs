/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render command implementation
 */

//! `quarto-ejs render`: render a template with a data context.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use super::{GlobalArgs, Session, template_failure};

#[derive(Debug, Default)]
pub struct RenderArgs {
    pub input: PathBuf,
    /// Inline JSON data context
    pub data: Option<String>,
    /// JSON or YAML file holding the data context
    pub data_file: Option<PathBuf>,
    /// Print the full result (output and extracted blocks) as JSON
    pub blocks: bool,
    pub output: Option<PathBuf>,
}

pub fn execute(global: &GlobalArgs, args: &RenderArgs) -> Result<()> {
    let session = Session::open(global, &args.input)?;
    let data = load_data(args.data.as_deref(), args.data_file.as_deref())?;

    let result = session
        .compiler
        .render_file(&args.input, &data, &session.options)
        .map_err(|err| template_failure(err, &args.input))?;

    let text = if args.blocks {
        serde_json::to_string_pretty(&result)?
    } else {
        result.output
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write output file {}", path.display()))?;
            info!("Output: {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn load_data(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    if let Some(json) = inline {
        return serde_json::from_str(json).context("Invalid --data JSON");
    }
    let Some(path) = file else {
        return Ok(Value::Object(Default::default()));
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yml" || ext == "yaml");
    if is_yaml {
        serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid YAML in data file {}", path.display()))
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in data file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_data_wins() {
        let data = load_data(Some(r#"{"a": 1}"#), Some(Path::new("/nonexistent.json"))).unwrap();
        assert_eq!(data, json!({"a": 1}));
    }

    #[test]
    fn test_yaml_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.yml");
        std::fs::write(&path, "name: Sam\nitems:\n  - a\n  - b\n").unwrap();
        assert_eq!(
            load_data(None, Some(&path)).unwrap(),
            json!({"name": "Sam", "items": ["a", "b"]})
        );
    }

    #[test]
    fn test_no_data_is_empty_object() {
        assert_eq!(load_data(None, None).unwrap(), json!({}));
    }
}
