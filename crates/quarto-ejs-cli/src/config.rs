/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Project configuration file
 */

//! `ejs.yml` project configuration.
//!
//! ```yaml
//! options:
//!   delimiter: "%"
//!   trim-whitespace: true
//! components:
//!   nav:
//!     root: components/nav
//!     main: index.ejs
//!     defaults: "{active: 'none'}"
//! ```
//!
//! Component roots are relative to the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quarto_ejs::{CompileOptions, ComponentRegistry, DirectoryComponent};
use serde::Deserialize;

/// File name looked up next to the template when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "ejs.yml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub options: CompileOptions,
    pub components: BTreeMap<String, ComponentConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub root: PathBuf,
    pub main: Option<PathBuf>,
    pub defaults: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: ProjectConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        for component in config.components.values_mut() {
            component.root = base_dir.join(&component.root);
        }
        Ok(config)
    }

    /// Load `explicit`, or `ejs.yml` next to `template` if it exists.
    pub fn discover(explicit: Option<&Path>, template: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = template
            .parent()
            .unwrap_or(Path::new("."))
            .join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(config = %candidate.display(), "Using project config");
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    pub fn registry(&self) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for (name, config) in &self.components {
            let mut component = DirectoryComponent::new(name.clone(), config.root.clone());
            if let Some(main) = &config.main {
                component = component.with_main(main.clone());
            }
            if let Some(defaults) = &config.defaults {
                component = component.with_defaults(defaults.clone());
            }
            registry.register(component);
        }
        registry
    }
}
