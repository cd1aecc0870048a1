/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl Token {
    pub(crate) fn is_punct(&self, punct: &str) -> bool {
        matches!(self, Token::Punct(p) if *p == punct)
    }

    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(name) if name == keyword)
    }
}

// Longest first, so `===` is not read as `==` followed by `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=",
    "/=", "=>", "{", "}", "(", ")", "[", "]", ";", ",", ".", "?", ":", "=", "+", "-", "*", "/",
    "%", "!", "<", ">",
];

pub(crate) fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            if i >= chars.len() {
                return Err(EvalError::syntax("Unterminated comment", source));
            }
            i += 2;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j], '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| EvalError::syntax(format!("Invalid number '{text}'"), source))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i, source)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        if c == '`' {
            return Err(EvalError::unsupported("template literal", source));
        }

        if is_identifier_start(c) {
            let start = i;
            while i < chars.len() && is_identifier_part(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        // `a ?.5 : b` is a conditional, not optional chaining
        let fraction_follows = chars.get(i + 2).is_some_and(char::is_ascii_digit);
        let punct = PUNCTUATORS
            .iter()
            .find(|p| rest.starts_with(**p) && !(**p == "?." && fraction_follows));
        match punct {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.chars().count();
            }
            None => {
                return Err(EvalError::syntax(format!("Unexpected character '{c}'"), source));
            }
        }
    }

    Ok(tokens)
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_string(chars: &[char], start: usize, source: &str) -> EvalResult<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((text, i + 1));
        }
        if c == '\\' {
            i += 1;
            let Some(&escaped) = chars.get(i) else {
                break;
            };
            match escaped {
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                '0' => text.push('\0'),
                'u' => {
                    let hex: String = chars.iter().skip(i + 1).take(4).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::syntax("Invalid unicode escape", source))?;
                    text.push(decoded);
                    i += 4;
                }
                '\n' => {}
                other => text.push(other),
            }
            i += 1;
            continue;
        }
        if c == '\n' {
            break;
        }
        text.push(c);
        i += 1;
    }

    Err(EvalError::syntax("Unterminated string literal", source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let tokens = tokenize("user.name === 'Sam' && count >= 1.5e1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("user".to_string()),
                Token::Punct("."),
                Token::Ident("name".to_string()),
                Token::Punct("==="),
                Token::Str("Sam".to_string()),
                Token::Punct("&&"),
                Token::Ident("count".to_string()),
                Token::Punct(">="),
                Token::Number(15.0),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\"b\n" 'it\'s' "é""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("a\"b\n".to_string()),
                Token::Str("it's".to_string()),
                Token::Str("é".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("a /* note */ + b // trailing\n").unwrap();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_conditional_with_fraction_is_not_optional_chain() {
        let tokens = tokenize("a ?.5 : 1").unwrap();
        assert_eq!(tokens[1], Token::Punct("?"));
        assert_eq!(tokens[2], Token::Number(0.5));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("'open"),
            Err(EvalError::Syntax { .. })
        ));
        assert!(matches!(
            tokenize("`hi ${x}`"),
            Err(EvalError::Unsupported { .. })
        ));
        assert!(matches!(tokenize("a # b"), Err(EvalError::Syntax { .. })));
    }
}
