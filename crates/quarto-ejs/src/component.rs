/*
 * component.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Components: named, self-contained template packages.
//!
//! A component owns a directory of resources and a main template. Templates
//! include components with `includeModule`; asset references inside a
//! component's templates resolve against the component rather than the file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{TemplateError, TemplateResult};
use crate::loader::{is_online_reference, normalize_path};

/// A named template package.
pub trait Component: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Path of a resource referenced from the component's templates.
    fn resolve_resource_path(&self, resource: &str) -> PathBuf;

    /// Path of the template rendered by `includeModule`.
    fn main_template_path(&self) -> PathBuf;

    /// Parameter expression applied beneath the explicit include params.
    fn default_params(&self) -> Option<String>;
}

/// Lookup of components by name.
pub trait ComponentLookup: Send + Sync {
    /// Find a component, failing with [`TemplateError::UnresolvedComponent`].
    fn lookup(&self, name: &str) -> TemplateResult<Arc<dyn Component>>;
}

/// Component rooted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryComponent {
    name: String,
    root: PathBuf,
    main: PathBuf,
    defaults: Option<String>,
}

impl DirectoryComponent {
    /// Main template defaults to `index.ejs` inside `root`.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            main: PathBuf::from("index.ejs"),
            defaults: None,
        }
    }

    pub fn with_main(mut self, main: impl Into<PathBuf>) -> Self {
        self.main = main.into();
        self
    }

    pub fn with_defaults(mut self, defaults: impl Into<String>) -> Self {
        self.defaults = Some(defaults.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Component for DirectoryComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_resource_path(&self, resource: &str) -> PathBuf {
        if is_online_reference(resource) {
            return PathBuf::from(resource);
        }
        normalize_path(&self.root.join(resource))
    }

    fn main_template_path(&self) -> PathBuf {
        normalize_path(&self.root.join(&self.main))
    }

    fn default_params(&self) -> Option<String> {
        self.defaults.clone()
    }
}

/// Name-indexed set of components.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under its own name, replacing any previous one.
    pub fn register(&mut self, component: impl Component + 'static) -> &mut Self {
        self.components
            .insert(component.name().to_string(), Arc::new(component));
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentLookup for ComponentRegistry {
    fn lookup(&self, name: &str) -> TemplateResult<Arc<dyn Component>> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::UnresolvedComponent {
                name: name.to_string(),
            })
    }
}
