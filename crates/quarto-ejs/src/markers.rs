/*
 * markers.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Passthrough asset markers.
//!
//! `includeJs` and `includeCss` leave `<% referjs PATH%>` and
//! `<% refercss PATH%>` markers in rendered output instead of the asset
//! itself. Bundlers run the output through [`strip_asset_directives`] to
//! collect the referenced paths and remove the markers, then splice in the
//! real assets.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::error::{TemplateError, TemplateResult};
use crate::tokenizer::{TagKind, Tokenizer};

static SCRIPT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*referjs\s+(\S+)").expect("valid regex"));
static STYLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*refercss\s+(\S+)").expect("valid regex"));
static ANY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<%[-_]?\s*(referjs|refercss)\s+([^\s%]+)\s*[-_]?%>").expect("valid regex")
});

/// Asset paths named by markers, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetMarkers {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

impl AssetMarkers {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.styles.is_empty()
    }

    fn record(&mut self, keyword: &str, path: &str) {
        match keyword {
            "referjs" => self.scripts.push(path.to_string()),
            _ => self.styles.push(path.to_string()),
        }
    }
}

/// List the markers in `text` without changing it.
pub fn scan_asset_markers(text: &str) -> AssetMarkers {
    let mut markers = AssetMarkers::default();
    for caps in ANY_MARKER.captures_iter(text) {
        markers.record(&caps[1], &caps[2]);
    }
    markers
}

/// Remove `referjs` / `refercss` markers written with `delimiter`, returning
/// the remaining text and the paths the markers named.
///
/// Fails with [`TemplateError::MalformedTag`] on an unterminated tag, like
/// compiling does.
pub fn strip_asset_directives(
    text: &str,
    delimiter: char,
) -> TemplateResult<(String, AssetMarkers)> {
    let tokenizer = Tokenizer::new(delimiter)?;
    let segments: Vec<_> = tokenizer.tokenize(text).collect();

    let mut markers = AssetMarkers::default();
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    while index < segments.len() {
        let segment = &segments[index];
        if let Some(tag) = segment.tag {
            let closer = segments.get(index + 2).and_then(|s| s.tag);
            if tag.is_opener() && !closer.is_some_and(TagKind::is_closer) {
                return Err(TemplateError::MalformedTag {
                    tag: segment.text.to_string(),
                    line: text[..segment.offset].matches('\n').count() + 1,
                    offset: segment.offset,
                    path: None,
                    source_text: Arc::from(text),
                });
            }
            if tag.accepts_directive() {
                if let Some(content) = segments.get(index + 1) {
                    let keyword = SCRIPT_MARKER
                        .captures(content.text)
                        .map(|caps| ("referjs", caps))
                        .or_else(|| STYLE_MARKER.captures(content.text).map(|c| ("refercss", c)));
                    if let Some((keyword, caps)) = keyword {
                        markers.record(keyword, &caps[1]);
                        index += 3;
                        continue;
                    }
                }
            }
        }
        out.push_str(segment.text);
        index += 1;
    }

    Ok((out, markers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_rendered_output() {
        let markers = scan_asset_markers(
            "<head><% referjs /c/nav/nav.js%>\n<% refercss /site/site.css%></head>",
        );
        assert_eq!(markers.scripts, vec!["/c/nav/nav.js".to_string()]);
        assert_eq!(markers.styles, vec!["/site/site.css".to_string()]);
    }

    #[test]
    fn test_strip_removes_markers_only() {
        let (text, markers) = strip_asset_directives(
            "a<% referjs x.js%>b<%= keep %>c<% refercss y.css %>",
            '%',
        )
        .unwrap();
        assert_eq!(text, "ab<%= keep %>c");
        assert_eq!(markers.scripts, vec!["x.js".to_string()]);
        assert_eq!(markers.styles, vec!["y.css".to_string()]);
    }

    #[test]
    fn test_strip_with_custom_delimiter() {
        let (text, markers) = strip_asset_directives("<? referjs a.js ?>z", '?').unwrap();
        assert_eq!(text, "z");
        assert_eq!(markers.scripts, vec!["a.js".to_string()]);
    }

    #[test]
    fn test_strip_rejects_unterminated_tag() {
        let err = strip_asset_directives("x <% referjs a.js", '%').unwrap_err();
        assert!(matches!(err, TemplateError::MalformedTag { offset: 2, .. }));
    }

    #[test]
    fn test_text_without_markers_is_unchanged() {
        let (text, markers) = strip_asset_directives("<p>plain</p>", '%').unwrap();
        assert_eq!(text, "<p>plain</p>");
        assert!(markers.is_empty());
    }
}
