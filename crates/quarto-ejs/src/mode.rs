/*
 * mode.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tag-mode state machine.
//!
//! Consumes segments in order and emits program instructions. Tag segments
//! switch the current [`Mode`]; literal segments are interpreted according to
//! the mode they appear in.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::options::CompileOptions;
use crate::program::{Instruction, Program};
use crate::tokenizer::{Segment, TagKind};

static TRAILING_SEMICOLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*$").expect("valid regex"));

/// Interpretation state of the content following an opening tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `<%` / `<%_`: statements
    Eval,
    /// `<%=`: escaped output
    Escaped,
    /// `<%-`: unescaped output
    Raw,
    /// `<%#`: discarded
    Comment,
    /// `<%%`: literal delimiter text
    Literal,
}

impl Mode {
    fn for_opener(tag: TagKind) -> Option<Mode> {
        match tag {
            TagKind::Open | TagKind::OpenSlurp => Some(Mode::Eval),
            TagKind::OpenEscaped => Some(Mode::Escaped),
            TagKind::OpenRaw => Some(Mode::Raw),
            TagKind::OpenComment => Some(Mode::Comment),
            TagKind::LiteralDelimiter => Some(Mode::Literal),
            TagKind::Close | TagKind::CloseTrim | TagKind::CloseSlurp => None,
        }
    }
}

#[derive(Debug)]
pub struct ModeMachine {
    delimiter: char,
    mode: Option<Mode>,
    truncate: bool,
    current_line: usize,
    trim_whitespace: bool,
    drop_blank_segments: bool,
    compile_diagnostics: bool,
}

impl ModeMachine {
    pub fn new(options: &CompileOptions) -> Self {
        Self {
            delimiter: options.delimiter,
            mode: None,
            truncate: false,
            current_line: 1,
            trim_whitespace: options.trim_whitespace,
            drop_blank_segments: options.drop_blank_segments,
            compile_diagnostics: options.compile_diagnostics,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// 1-based line of the next segment.
    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// Process one segment.
    pub fn scan(&mut self, segment: &Segment<'_>, program: &mut Program) {
        match segment.tag {
            Some(tag) => self.scan_tag(tag, segment.text, program),
            None => {
                let blank = self.drop_blank_segments && segment.text.trim().is_empty();
                let text = if blank { "" } else { segment.text };
                self.scan_text(text, program);
            }
        }
        self.advance_lines(segment.newline_count(), program);
    }

    /// Move the line counter past `count` line breaks consumed elsewhere.
    pub fn advance_lines(&mut self, count: usize, program: &mut Program) {
        if count == 0 {
            return;
        }
        self.current_line += count;
        if self.compile_diagnostics {
            program.push(Instruction::Line(self.current_line));
        }
    }

    fn scan_tag(&mut self, tag: TagKind, text: &str, program: &mut Program) {
        if tag.is_closer() {
            if self.mode == Some(Mode::Literal) {
                self.add_output(text, program);
            }
            self.mode = None;
            self.truncate = matches!(tag, TagKind::CloseTrim | TagKind::CloseSlurp);
            return;
        }

        self.mode = Mode::for_opener(tag);
        if tag == TagKind::LiteralDelimiter {
            program.push(Instruction::Append(TagKind::Open.text(self.delimiter)));
        }
    }

    fn scan_text(&mut self, text: &str, program: &mut Program) {
        let Some(mode) = self.mode else {
            self.add_output(text, program);
            return;
        };

        match mode {
            Mode::Eval => program.push(Instruction::Exec(close_line_comment(text))),
            Mode::Escaped => program.push(Instruction::AppendEscaped(output_expression(text))),
            Mode::Raw => program.push(Instruction::AppendRaw(output_expression(text))),
            Mode::Comment => {}
            Mode::Literal => self.add_output(text, program),
        }
    }

    fn add_output(&mut self, text: &str, program: &mut Program) {
        let text = if self.truncate {
            self.truncate = false;
            remove_first_newline(text)
        } else if self.trim_whitespace {
            Cow::Borrowed(text.strip_prefix('\n').unwrap_or(text))
        } else {
            Cow::Borrowed(text)
        };
        if text.is_empty() {
            return;
        }
        program.push(Instruction::Append(text.into_owned()));
    }
}

/// A trimming closer removes the first `\n` of the next output text,
/// wherever it occurs. A `\r` in front of it is kept.
fn remove_first_newline(text: &str) -> Cow<'_, str> {
    match text.find('\n') {
        Some(index) => Cow::Owned(format!("{}{}", &text[..index], &text[index + 1..])),
        None => Cow::Borrowed(text),
    }
}

/// A `//` comment after the fragment's last line break would swallow
/// whatever follows the fragment, so end it with a line break.
fn close_line_comment(text: &str) -> String {
    let comment = text.rfind("//");
    let newline = text.rfind('\n');
    match (comment, newline) {
        (Some(c), Some(n)) if c > n => format!("{text}\n"),
        (Some(_), None) => format!("{text}\n"),
        _ => text.to_string(),
    }
}

fn output_expression(text: &str) -> String {
    let text = close_line_comment(text);
    TRAILING_SEMICOLON.replace(&text, "").trim().to_string()
}
