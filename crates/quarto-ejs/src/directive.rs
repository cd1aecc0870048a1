/*
 * directive.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Directive recognition.
//!
//! A directive is a keyword-led instruction that forms the whole content of
//! an evaluate tag (`<% include header %>`). The compiler rewrites directives
//! instead of forwarding them to the evaluator.

use std::sync::LazyLock;

use regex::Regex;

static FILE_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*include\s+(\S+)(?:\s+([\s\S]*))?$").expect("valid regex")
});
static COMPONENT_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*includeModule\s+(\S+)(?:\s+([\s\S]*))?$").expect("valid regex")
});
static SCRIPT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*includeJs\s+(\S+)").expect("valid regex"));
static STYLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*includeCss\s+(\S+)").expect("valid regex"));
static BEGIN_EXTRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*includeAt\s+([\s\S]*)$").expect("valid regex"));
static END_EXTRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*endAt\s*$").expect("valid regex"));

/// A recognized directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `include <path> [<params>]`
    FileInclude {
        path: String,
        params: Option<String>,
    },
    /// `includeModule <name> [<params>]`
    ComponentInclude {
        name: String,
        params: Option<String>,
    },
    /// `includeJs <ref>`
    ScriptRef(String),
    /// `includeCss <ref>`
    StyleRef(String),
    /// `includeAt <params-expression>`
    BeginExtract { params: String },
    /// `endAt`
    EndExtract,
}

impl Directive {
    /// Parse the content of an evaluate tag. Returns `None` for ordinary code.
    ///
    /// Patterns are tried in a fixed order and the first match wins.
    pub fn parse(content: &str) -> Option<Directive> {
        if let Some(caps) = FILE_INCLUDE.captures(content) {
            return Some(Directive::FileInclude {
                path: caps[1].to_string(),
                params: optional_params(caps.get(2).map(|m| m.as_str())),
            });
        }
        if let Some(caps) = COMPONENT_INCLUDE.captures(content) {
            return Some(Directive::ComponentInclude {
                name: caps[1].to_string(),
                params: optional_params(caps.get(2).map(|m| m.as_str())),
            });
        }
        if let Some(caps) = SCRIPT_REF.captures(content) {
            return Some(Directive::ScriptRef(caps[1].to_string()));
        }
        if let Some(caps) = STYLE_REF.captures(content) {
            return Some(Directive::StyleRef(caps[1].to_string()));
        }
        if let Some(caps) = BEGIN_EXTRACT.captures(content) {
            let params: String = caps[1]
                .chars()
                .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
                .collect();
            return Some(Directive::BeginExtract {
                params: params.trim().to_string(),
            });
        }
        if END_EXTRACT.is_match(content) {
            return Some(Directive::EndExtract);
        }
        None
    }

    /// Directive keyword, for logging.
    pub fn keyword(&self) -> &'static str {
        match self {
            Directive::FileInclude { .. } => "include",
            Directive::ComponentInclude { .. } => "includeModule",
            Directive::ScriptRef(_) => "includeJs",
            Directive::StyleRef(_) => "includeCss",
            Directive::BeginExtract { .. } => "includeAt",
            Directive::EndExtract => "endAt",
        }
    }
}

fn optional_params(params: Option<&str>) -> Option<String> {
    params
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_include() {
        assert_eq!(
            Directive::parse(" include partials/header "),
            Some(Directive::FileInclude {
                path: "partials/header".to_string(),
                params: None,
            })
        );
        assert_eq!(
            Directive::parse(" include header {title: 'Home'} "),
            Some(Directive::FileInclude {
                path: "header".to_string(),
                params: Some("{title: 'Home'}".to_string()),
            })
        );
    }

    #[test]
    fn test_component_include_is_not_a_file_include() {
        assert_eq!(
            Directive::parse(" includeModule nav {active: 'home'} "),
            Some(Directive::ComponentInclude {
                name: "nav".to_string(),
                params: Some("{active: 'home'}".to_string()),
            })
        );
        assert_eq!(
            Directive::parse("includeModule footer"),
            Some(Directive::ComponentInclude {
                name: "footer".to_string(),
                params: None,
            })
        );
    }

    #[test]
    fn test_asset_references() {
        assert_eq!(
            Directive::parse(" includeJs js/app.js "),
            Some(Directive::ScriptRef("js/app.js".to_string()))
        );
        assert_eq!(
            Directive::parse(" includeCss https://cdn.example.com/a.css "),
            Some(Directive::StyleRef(
                "https://cdn.example.com/a.css".to_string()
            ))
        );
    }

    #[test]
    fn test_extraction_markers() {
        assert_eq!(
            Directive::parse(" includeAt {\n\tx: 1\r\n} "),
            Some(Directive::BeginExtract {
                params: "{x: 1}".to_string(),
            })
        );
        assert_eq!(Directive::parse(" endAt "), Some(Directive::EndExtract));
        assert_eq!(Directive::parse("endAt()"), None);
    }

    #[test]
    fn test_ordinary_code_is_not_a_directive() {
        assert_eq!(Directive::parse(" if (include) { "), None);
        assert_eq!(Directive::parse(" includes.forEach(f) "), None);
        assert_eq!(Directive::parse(" var include = 1 "), None);
        assert_eq!(Directive::parse(" include "), None);
    }

    #[test]
    fn test_keyword() {
        assert_eq!(Directive::EndExtract.keyword(), "endAt");
        assert_eq!(Directive::ScriptRef("a".to_string()).keyword(), "includeJs");
    }
}
