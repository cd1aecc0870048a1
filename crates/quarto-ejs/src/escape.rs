/*
 * escape.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output escaping.

/// Escape a rendered value for inclusion in HTML/XML markup.
///
/// This is the default escape function for `<%= ... %>` tags.
pub fn escape_xml(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    for c in markup.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for embedding inside a double-quoted string in the
/// generated program listing.
pub(crate) fn escape_string_literal(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_xml_passthrough() {
        assert_eq!(escape_xml("plain text"), "plain text");
        assert_eq!(escape_xml(""), "");
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(
            escape_string_literal("a\\b\n\"c\"\r"),
            "a\\\\b\\n\\\"c\\\"\\r"
        );
    }
}
