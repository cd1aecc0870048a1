/*
 * collector.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Asset dependency collection.
//!
//! Script and style references come from the `includeJs` / `includeCss`
//! directives. Image references are found by scanning the whole template
//! text for `<img>` sources and `url(...)` references in elements styled
//! with a background; this scan is not tag aware.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::Serialize;

use crate::component::Component;
use crate::loader::{is_online_reference, resolve_resource_path};

static IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").expect("valid regex"));
static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[^\w-])src\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});
static DATA_SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bdata-src\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});
static BACKGROUND_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<[^<>]*background[^<>]*>").expect("valid regex"));
static URL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^\s"')]+))\s*\)"#).expect("valid regex")
});

/// A referenced asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescriptor {
    /// Owning component, if the reference was resolved through one.
    pub component: Option<String>,
    /// The reference as written in the template.
    pub resource_name: String,
    /// Where the reference resolves to.
    pub resource_path: PathBuf,
}

/// The three asset lists of a compiled template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetDependencies {
    pub scripts: Vec<DependencyDescriptor>,
    pub styles: Vec<DependencyDescriptor>,
    pub images: Vec<DependencyDescriptor>,
}

impl AssetDependencies {
    /// Append another template's lists. No deduplication happens across
    /// templates.
    pub fn append(&mut self, other: AssetDependencies) {
        self.scripts.extend(other.scripts);
        self.styles.extend(other.styles);
        self.images.extend(other.images);
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.styles.is_empty() && self.images.is_empty()
    }
}

/// Kinds of directive-referenced assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Script,
    Style,
}

impl AssetKind {
    /// Keyword of the passthrough marker left in the output.
    pub fn marker(self) -> &'static str {
        match self {
            AssetKind::Script => "referjs",
            AssetKind::Style => "refercss",
        }
    }
}

/// Per-pass dependency state of one template.
#[derive(Debug)]
pub struct DependencyCollector {
    component: Option<Arc<dyn Component>>,
    source_path: Option<PathBuf>,
    assets: AssetDependencies,
    seen_scripts: HashSet<String>,
    seen_styles: HashSet<String>,
    seen_images: HashSet<String>,
}

impl DependencyCollector {
    pub fn new(component: Option<Arc<dyn Component>>, source_path: Option<&Path>) -> Self {
        Self {
            component,
            source_path: source_path.map(Path::to_path_buf),
            assets: AssetDependencies::default(),
            seen_scripts: HashSet::new(),
            seen_styles: HashSet::new(),
            seen_images: HashSet::new(),
        }
    }

    /// Record a script or style reference and return the path the marker
    /// should name.
    ///
    /// Descriptors are unique by resource name within this pass.
    pub fn reference(&mut self, kind: AssetKind, reference: &str) -> PathBuf {
        let descriptor = self.describe(reference, true);
        let resource_path = descriptor.resource_path.clone();
        let (seen, list) = match kind {
            AssetKind::Script => (&mut self.seen_scripts, &mut self.assets.scripts),
            AssetKind::Style => (&mut self.seen_styles, &mut self.assets.styles),
        };
        if seen.insert(descriptor.resource_name.clone()) {
            list.push(descriptor);
        }
        resource_path
    }

    /// Scan template text for image references.
    ///
    /// Online references are skipped; the rest are unique by the raw
    /// reference string within this pass, in first-seen order.
    pub fn scan_images(&mut self, text: &str) {
        for tag in IMAGE_TAG.find_iter(text) {
            let tag = tag.as_str();
            if let Some(src) = SRC_ATTR.captures(tag) {
                self.record_image(attribute_value(&src));
            }
            if let Some(data_src) = DATA_SRC_ATTR.captures(tag) {
                self.record_image(attribute_value(&data_src));
            }
        }

        for element in BACKGROUND_ELEMENT.find_iter(text) {
            for url in URL_REFERENCE.captures_iter(element.as_str()) {
                self.record_image(attribute_value(&url));
            }
        }
    }

    /// Merge the descriptors of a nested template.
    pub fn merge(&mut self, nested: AssetDependencies) {
        self.assets.append(nested);
    }

    pub fn finish(self) -> AssetDependencies {
        self.assets
    }

    fn record_image(&mut self, reference: &str) {
        if reference.is_empty() || is_online_reference(reference) {
            return;
        }
        if !self.seen_images.insert(reference.to_string()) {
            return;
        }
        let descriptor = self.describe(reference, false);
        tracing::trace!(image = reference, "Collected image dependency");
        self.assets.images.push(descriptor);
    }

    fn describe(&self, reference: &str, keep_online: bool) -> DependencyDescriptor {
        let (component, resource_path) = match &self.component {
            Some(component) => (
                Some(component.name().to_string()),
                component.resolve_resource_path(reference),
            ),
            None if keep_online && is_online_reference(reference) => {
                (None, PathBuf::from(reference))
            }
            None => (
                None,
                resolve_resource_path(reference, self.source_path.as_deref()),
            ),
        };
        DependencyDescriptor {
            component,
            resource_name: reference.to_string(),
            resource_path,
        }
    }
}

fn attribute_value<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map_or("", |m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DirectoryComponent;
    use pretty_assertions::assert_eq;

    fn image_names(text: &str) -> Vec<String> {
        let mut collector = DependencyCollector::new(None, Some(Path::new("/site/index.ejs")));
        collector.scan_images(text);
        collector
            .finish()
            .images
            .into_iter()
            .map(|d| d.resource_name)
            .collect()
    }

    #[test]
    fn test_image_sources() {
        assert_eq!(
            image_names(r#"<img src="a.png"><IMG alt='x' src='b.png' /><img src=c.png>"#),
            vec!["a.png", "b.png", "c.png"]
        );
    }

    #[test]
    fn test_data_src_is_not_read_as_src() {
        assert_eq!(
            image_names(r#"<img data-src="lazy.png" src="placeholder.png">"#),
            vec!["placeholder.png", "lazy.png"]
        );
        assert_eq!(image_names(r#"<img data-src="lazy.png">"#), vec!["lazy.png"]);
    }

    #[test]
    fn test_duplicate_references_are_collected_once() {
        assert_eq!(
            image_names(r#"<img src="a.png"><img src="a.png"><img src="./a.png">"#),
            vec!["a.png", "./a.png"]
        );
    }

    #[test]
    fn test_online_references_are_skipped() {
        assert_eq!(
            image_names(r#"<img src="https://cdn.example.com/a.png"><img src="b.png">"#),
            vec!["b.png"]
        );
    }

    #[test]
    fn test_background_urls() {
        let text = r#"<div style="background: url('bg.png') no-repeat, url(tile.gif)">
<span style="background-image:url(hero.jpg)">
<p style="color: red">url(not-an-image.png)</p>"#;
        assert_eq!(image_names(text), vec!["bg.png", "tile.gif", "hero.jpg"]);
    }

    #[test]
    fn test_image_paths_resolve_against_template() {
        let mut collector = DependencyCollector::new(None, Some(Path::new("/site/pages/a.ejs")));
        collector.scan_images(r#"<img src="../img/logo.png">"#);
        let images = collector.finish().images;
        assert_eq!(images[0].resource_path, PathBuf::from("/site/img/logo.png"));
        assert_eq!(images[0].component, None);
    }

    #[test]
    fn test_component_resolution() {
        let component: Arc<dyn Component> = Arc::new(DirectoryComponent::new("nav", "/c/nav"));
        let mut collector = DependencyCollector::new(Some(component), None);
        let path = collector.reference(AssetKind::Script, "nav.js");
        assert_eq!(path, PathBuf::from("/c/nav/nav.js"));

        let assets = collector.finish();
        assert_eq!(assets.scripts[0].component.as_deref(), Some("nav"));
    }

    #[test]
    fn test_script_references_dedup_by_name() {
        let mut collector = DependencyCollector::new(None, Some(Path::new("/site/index.ejs")));
        collector.reference(AssetKind::Script, "app.js");
        collector.reference(AssetKind::Script, "app.js");
        collector.reference(AssetKind::Style, "app.js");
        let online = collector.reference(AssetKind::Style, "https://cdn.example.com/a.css");
        assert_eq!(online, PathBuf::from("https://cdn.example.com/a.css"));

        let assets = collector.finish();
        assert_eq!(assets.scripts.len(), 1);
        assert_eq!(assets.styles.len(), 2);
        assert_eq!(assets.scripts[0].resource_path, PathBuf::from("/site/app.js"));
    }

    #[test]
    fn test_merge_does_not_dedup_across_templates() {
        let mut collector = DependencyCollector::new(None, None);
        collector.scan_images(r#"<img src="a.png">"#);
        let mut nested = DependencyCollector::new(None, None);
        nested.scan_images(r#"<img src="a.png">"#);
        collector.merge(nested.finish());
        assert_eq!(collector.finish().images.len(), 2);
    }
}
