/*
 * tokenizer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splits template text into literal and tag segments.
//!
//! The tokenizer does not look inside tags: `<% if (a) { %>` becomes the
//! three segments `<%`, ` if (a) { ` and `%>`. Interpreting the sequence is
//! the job of the mode state machine and the directive processor.

use regex::Regex;

use crate::error::{TemplateError, TemplateResult};

/// The kinds of tag segments, for a delimiter `%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// `<%`
    Open,
    /// `<%_` (slurps preceding horizontal whitespace)
    OpenSlurp,
    /// `<%=`
    OpenEscaped,
    /// `<%-`
    OpenRaw,
    /// `<%#`
    OpenComment,
    /// `<%%`, an escaped literal delimiter
    LiteralDelimiter,
    /// `%>`
    Close,
    /// `-%>` (trims the following newline)
    CloseTrim,
    /// `_%>` (slurps following horizontal whitespace, trims the newline)
    CloseSlurp,
}

impl TagKind {
    /// Tags that open a region which must be closed.
    pub fn is_opener(self) -> bool {
        matches!(
            self,
            TagKind::Open
                | TagKind::OpenSlurp
                | TagKind::OpenEscaped
                | TagKind::OpenRaw
                | TagKind::OpenComment
        )
    }

    pub fn is_closer(self) -> bool {
        matches!(self, TagKind::Close | TagKind::CloseTrim | TagKind::CloseSlurp)
    }

    /// Openers after which directives are recognized.
    pub fn accepts_directive(self) -> bool {
        matches!(self, TagKind::Open | TagKind::OpenSlurp | TagKind::OpenRaw)
    }

    /// The tag text for the given delimiter.
    pub fn text(self, delimiter: char) -> String {
        let d = delimiter;
        match self {
            TagKind::Open => format!("<{d}"),
            TagKind::OpenSlurp => format!("<{d}_"),
            TagKind::OpenEscaped => format!("<{d}="),
            TagKind::OpenRaw => format!("<{d}-"),
            TagKind::OpenComment => format!("<{d}#"),
            TagKind::LiteralDelimiter => format!("<{d}{d}"),
            TagKind::Close => format!("{d}>"),
            TagKind::CloseTrim => format!("-{d}>"),
            TagKind::CloseSlurp => format!("_{d}>"),
        }
    }

    fn classify(text: &str, delimiter: char) -> Option<TagKind> {
        const ALL: [TagKind; 9] = [
            TagKind::LiteralDelimiter,
            TagKind::OpenEscaped,
            TagKind::OpenRaw,
            TagKind::OpenSlurp,
            TagKind::OpenComment,
            TagKind::Open,
            TagKind::Close,
            TagKind::CloseTrim,
            TagKind::CloseSlurp,
        ];
        ALL.into_iter().find(|kind| kind.text(delimiter) == text)
    }
}

/// A piece of template text: either literal text or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The exact source text of the segment.
    pub text: &'a str,
    /// Byte offset of the segment in the tokenized text.
    pub offset: usize,
    /// `Some` for tag segments.
    pub tag: Option<TagKind>,
}

impl Segment<'_> {
    pub fn is_literal(&self) -> bool {
        self.tag.is_none()
    }

    /// Number of line breaks inside the segment.
    pub fn newline_count(&self) -> usize {
        self.text.matches('\n').count()
    }
}

/// Tokenizer for a fixed delimiter.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    delimiter: char,
    pattern: Regex,
}

impl Tokenizer {
    /// Build the tag pattern for `delimiter`.
    ///
    /// The alternation order puts `<%%` before `<%` so an escaped delimiter is
    /// never read as an opening tag.
    pub fn new(delimiter: char) -> TemplateResult<Self> {
        if delimiter.is_whitespace() || matches!(delimiter, '<' | '>' | '-' | '_' | '=' | '#') {
            return Err(TemplateError::InvalidDelimiter { delimiter });
        }
        let d = regex::escape(&delimiter.to_string());
        let source = format!("(<{d}{d}|<{d}=|<{d}-|<{d}_|<{d}#|<{d}|{d}>|-{d}>|_{d}>)");
        let pattern = Regex::new(&source).map_err(|_| TemplateError::InvalidDelimiter { delimiter })?;
        Ok(Self { delimiter, pattern })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Lazily split `text` into segments.
    pub fn tokenize<'t>(&self, text: &'t str) -> Segments<'_, 't> {
        Segments {
            tokenizer: self,
            text,
            pos: 0,
            pending: None,
        }
    }
}

/// Iterator over the segments of a template text.
#[derive(Debug)]
pub struct Segments<'r, 't> {
    tokenizer: &'r Tokenizer,
    text: &'t str,
    pos: usize,
    pending: Option<Segment<'t>>,
}

impl<'t> Iterator for Segments<'_, 't> {
    type Item = Segment<'t>;

    fn next(&mut self) -> Option<Segment<'t>> {
        if let Some(tag) = self.pending.take() {
            return Some(tag);
        }
        if self.pos >= self.text.len() {
            return None;
        }

        match self.tokenizer.pattern.find_at(self.text, self.pos) {
            Some(m) => {
                let tag = Segment {
                    text: m.as_str(),
                    offset: m.start(),
                    tag: TagKind::classify(m.as_str(), self.tokenizer.delimiter),
                };
                let literal_start = self.pos;
                self.pos = m.end();
                if m.start() > literal_start {
                    self.pending = Some(tag);
                    Some(Segment {
                        text: &self.text[literal_start..m.start()],
                        offset: literal_start,
                        tag: None,
                    })
                } else {
                    Some(tag)
                }
            }
            None => {
                let literal_start = self.pos;
                self.pos = self.text.len();
                Some(Segment {
                    text: &self.text[literal_start..],
                    offset: literal_start,
                    tag: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(delimiter: char, source: &str) -> Vec<String> {
        let tokenizer = Tokenizer::new(delimiter).unwrap();
        tokenizer
            .tokenize(source)
            .map(|s| s.text.to_string())
            .collect()
    }

    #[test]
    fn test_plain_text_is_one_segment() {
        assert_eq!(texts('%', "hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(texts('%', "").is_empty());
    }

    #[test]
    fn test_escaped_output_tag() {
        assert_eq!(
            texts('%', "Hi <%= name %>!"),
            vec!["Hi ", "<%=", " name ", "%>", "!"]
        );
    }

    #[test]
    fn test_all_openers() {
        assert_eq!(
            texts('%', "<%a%><%_b_%><%=c-%><%-d%><%#e%>"),
            vec![
                "<%", "a", "%>", "<%_", "b", "_%>", "<%=", "c", "-%>", "<%-", "d", "%>", "<%#",
                "e", "%>"
            ]
        );
    }

    #[test]
    fn test_literal_delimiter_is_not_an_opener() {
        let tokenizer = Tokenizer::new('%').unwrap();
        let segments: Vec<_> = tokenizer.tokenize("<%% x %>").collect();
        assert_eq!(segments[0].tag, Some(TagKind::LiteralDelimiter));
        assert_eq!(segments[1].tag, None);
        assert_eq!(segments[2].tag, Some(TagKind::Close));
    }

    #[test]
    fn test_segments_cover_input_without_gaps() {
        let source = "a<% b %>\nc<%= d -%>e";
        let tokenizer = Tokenizer::new('%').unwrap();
        let mut expected_offset = 0;
        let mut rebuilt = String::new();
        for segment in tokenizer.tokenize(source) {
            assert_eq!(segment.offset, expected_offset);
            expected_offset += segment.text.len();
            rebuilt.push_str(segment.text);
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_custom_delimiter_is_regex_escaped() {
        assert_eq!(
            texts('?', "x <?= y ?> <% z %>"),
            vec!["x ", "<?=", " y ", "?>", " <% z %>"]
        );
        assert_eq!(texts('$', "<$$ a $>"), vec!["<$$", " a ", "$>"]);
    }

    #[test]
    fn test_invalid_delimiters() {
        for delimiter in ['<', '>', '-', '_', '=', '#', ' '] {
            assert!(matches!(
                Tokenizer::new(delimiter),
                Err(TemplateError::InvalidDelimiter { .. })
            ));
        }
    }

    #[test]
    fn test_tag_kind_predicates() {
        assert!(TagKind::OpenEscaped.is_opener());
        assert!(!TagKind::LiteralDelimiter.is_opener());
        assert!(TagKind::CloseSlurp.is_closer());
        assert!(TagKind::OpenRaw.accepts_directive());
        assert!(!TagKind::OpenEscaped.accepts_directive());
        assert_eq!(TagKind::CloseTrim.text('?'), "-?>");
    }

    #[test]
    fn test_newline_count() {
        let tokenizer = Tokenizer::new('%').unwrap();
        let first = tokenizer.tokenize("a\nb\nc").next().unwrap();
        assert_eq!(first.newline_count(), 2);
    }
}
