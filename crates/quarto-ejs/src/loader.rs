/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template loading and path resolution.
//!
//! This module provides the [`TemplateLoader`] trait used to read included
//! templates, with filesystem and in-memory implementations, and the path
//! rules shared by includes and asset references.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Extension appended to include references that have none.
pub const DEFAULT_EXTENSION: &str = "ejs";

static ONLINE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(svn|ftp|https?):").expect("valid regex"));

/// Trait for loading templates referenced by include directives.
pub trait TemplateLoader: Send + Sync {
    /// Resolve an include reference against the including template's path.
    fn resolve_include_path(&self, reference: &str, current: &Path) -> PathBuf {
        resolve_include_path(reference, current)
    }

    /// Read a template's source text, without a leading byte-order mark.
    fn read_template_source(&self, path: &Path) -> io::Result<String>;
}

/// Loader that reads templates from the filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader;

impl TemplateLoader for FileSystemLoader {
    fn read_template_source(&self, path: &Path) -> io::Result<String> {
        let text = std::fs::read_to_string(path)?;
        Ok(strip_bom(&text).to_string())
    }
}

/// Loader backed by an in-memory map of paths to template text.
///
/// Useful for testing and for templates bundled into the application.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template. The path is normalized the same way include
    /// references are.
    pub fn add(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> &mut Self {
        self.templates
            .insert(normalize_path(path.as_ref()), text.into());
        self
    }

    pub fn with_templates(
        templates: impl IntoIterator<Item = (impl AsRef<Path>, impl Into<String>)>,
    ) -> Self {
        let mut loader = Self::new();
        for (path, text) in templates {
            loader.add(path, text);
        }
        loader
    }
}

impl TemplateLoader for MemoryLoader {
    fn read_template_source(&self, path: &Path) -> io::Result<String> {
        self.templates
            .get(&normalize_path(path))
            .map(|text| strip_bom(text).to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no template registered at {}", path.display()),
                )
            })
    }
}

/// Resolve an include reference.
///
/// The reference is taken relative to the directory of `current`, and
/// `.ejs` is appended when the reference has no extension of its own.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use quarto_ejs::loader::resolve_include_path;
///
/// let current = Path::new("/site/pages/index.ejs");
/// assert_eq!(
///     resolve_include_path("../partials/header", current),
///     PathBuf::from("/site/partials/header.ejs")
/// );
/// ```
pub fn resolve_include_path(reference: &str, current: &Path) -> PathBuf {
    let base_dir = current.parent().unwrap_or(Path::new("."));
    let mut resolved = base_dir.join(reference).into_os_string();
    if Path::new(reference).extension().is_none() {
        resolved.push(".");
        resolved.push(DEFAULT_EXTENSION);
    }
    normalize_path(Path::new(&resolved))
}

/// Resolve an asset reference against the template that mentions it.
///
/// Without a template path the reference stays relative to the working
/// directory.
pub fn resolve_resource_path(reference: &str, current: Option<&Path>) -> PathBuf {
    match current.and_then(Path::parent) {
        Some(base_dir) => normalize_path(&base_dir.join(reference)),
        None => normalize_path(Path::new(reference)),
    }
}

/// Whether a reference names a network resource (`svn:`, `ftp:`, `http:`,
/// `https:`), which is never resolved or collected.
pub fn is_online_reference(reference: &str) -> bool {
    ONLINE_REFERENCE.is_match(reference)
}

/// Remove a leading byte-order mark.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Lexically remove `.` and `..` components. The filesystem is not consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
