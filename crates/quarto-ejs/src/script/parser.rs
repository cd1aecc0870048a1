/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parser for the script subset.

use serde_json::Value;

use super::lexer::{Token, tokenize};
use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Update {
        target: Box<Expr>,
        delta: f64,
        prefix: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Declare {
        kind: DeclKind,
        declarations: Vec<(String, Option<Expr>)>,
    },
    Expr(Expr),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        binding: String,
        object: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Empty,
}

/// Parse a single expression.
pub(crate) fn parse_expression(source: &str) -> EvalResult<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expression()?;
    parser.eat(";");
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a sequence of statements.
pub(crate) fn parse_statements(source: &str) -> EvalResult<Vec<Stmt>> {
    let mut parser = Parser::new(source)?;
    let mut statements = Vec::new();
    while !parser.at_end() {
        statements.push(parser.statement()?);
    }
    Ok(statements)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> EvalResult<Self> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(punct))
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.check(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> EvalResult<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("Expected '{punct}'")))
        }
    }

    fn expect_end(&self) -> EvalResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("Unexpected token"))
        }
    }

    fn identifier(&mut self) -> EvalResult<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("Expected identifier")),
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        let message = message.into();
        let message = match self.peek() {
            Some(token) => format!("{message} near {}", describe(token)),
            None => format!("{message} at end of input"),
        };
        EvalError::syntax(message, self.source)
    }

    fn unsupported(&self, construct: &str) -> EvalError {
        EvalError::unsupported(construct, self.source)
    }

    // Statements

    fn statement(&mut self) -> EvalResult<Stmt> {
        if self.eat(";") {
            return Ok(Stmt::Empty);
        }
        if self.eat("{") {
            return self.block_rest();
        }
        if let Some(kind) = self.declaration_kind() {
            self.pos += 1;
            let statement = self.declaration(kind)?;
            self.end_statement()?;
            return Ok(statement);
        }
        if self.eat_keyword("if") {
            return self.if_statement();
        }
        if self.eat_keyword("while") {
            self.expect("(")?;
            let test = self.expression()?;
            self.expect(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::While { test, body });
        }
        if self.eat_keyword("for") {
            return self.for_statement();
        }
        for keyword in ["function", "return", "break", "continue", "switch", "try", "throw", "do", "class"] {
            if self.check_keyword(keyword) {
                return Err(self.unsupported(&format!("'{keyword}' statement")));
            }
        }

        let expr = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expr(expr))
    }

    /// Statements end with `;`, a closing brace, or the end of input.
    fn end_statement(&mut self) -> EvalResult<()> {
        if self.eat(";") || self.at_end() || self.check("}") {
            return Ok(());
        }
        Err(self.error("Expected ';'"))
    }

    fn block_rest(&mut self) -> EvalResult<Stmt> {
        let mut statements = Vec::new();
        while !self.eat("}") {
            if self.at_end() {
                return Err(self.error("Expected '}'"));
            }
            statements.push(self.statement()?);
        }
        Ok(Stmt::Block(statements))
    }

    fn declaration_kind(&self) -> Option<DeclKind> {
        match self.peek() {
            Some(Token::Ident(name)) => match name.as_str() {
                "var" => Some(DeclKind::Var),
                "let" => Some(DeclKind::Let),
                "const" => Some(DeclKind::Const),
                _ => None,
            },
            _ => None,
        }
    }

    fn declaration(&mut self, kind: DeclKind) -> EvalResult<Stmt> {
        let mut declarations = Vec::new();
        loop {
            let name = self.identifier()?;
            let init = if self.eat("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat(",") {
                break;
            }
        }
        Ok(Stmt::Declare { kind, declarations })
    }

    fn if_statement(&mut self) -> EvalResult<Stmt> {
        self.expect("(")?;
        let test = self.expression()?;
        self.expect(")")?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> EvalResult<Stmt> {
        self.expect("(")?;

        // for (x of xs) / for (const x in obj)
        let has_decl = self.declaration_kind().is_some();
        let name_offset = usize::from(has_decl);
        let iteration = match (self.peek_at(name_offset), self.peek_at(name_offset + 1)) {
            (Some(Token::Ident(binding)), Some(Token::Ident(word))) if word == "of" || word == "in" => {
                Some((binding.clone(), word == "of"))
            }
            _ => None,
        };
        if let Some((binding, is_of)) = iteration {
            self.pos += name_offset + 2;
            let source = self.expression()?;
            self.expect(")")?;
            let body = Box::new(self.statement()?);
            return Ok(if is_of {
                Stmt::ForOf {
                    binding,
                    iterable: source,
                    body,
                }
            } else {
                Stmt::ForIn {
                    binding,
                    object: source,
                    body,
                }
            });
        }

        let init = if self.eat(";") {
            None
        } else {
            let init = match self.declaration_kind() {
                Some(kind) => {
                    self.pos += 1;
                    self.declaration(kind)?
                }
                None => Stmt::Expr(self.expression()?),
            };
            self.expect(";")?;
            Some(Box::new(init))
        };
        let test = if self.check(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(";")?;
        let update = if self.check(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    // Expressions

    fn expression(&mut self) -> EvalResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> EvalResult<Expr> {
        let target = self.conditional()?;

        if self.check("=>") {
            return Err(self.unsupported("arrow function"));
        }

        let op = match self.peek() {
            Some(Token::Punct("=")) => None,
            Some(Token::Punct("+=")) => Some(BinaryOp::Add),
            Some(Token::Punct("-=")) => Some(BinaryOp::Sub),
            Some(Token::Punct("*=")) => Some(BinaryOp::Mul),
            Some(Token::Punct("/=")) => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        if !is_assignable(&target) {
            return Err(self.error("Invalid assignment target"));
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            target: Box::new(target),
            op,
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> EvalResult<Expr> {
        let test = self.binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_precedence: u8) -> EvalResult<Expr> {
        let mut left = self.unary()?;

        while let Some(token) = self.peek() {
            let Some((precedence, op)) = binary_operator(token) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.binary(precedence + 1)?;
            left = match op {
                Operator::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        let op = if self.eat("!") {
            Some(UnaryOp::Not)
        } else if self.eat("-") {
            Some(UnaryOp::Neg)
        } else if self.eat("+") {
            Some(UnaryOp::Plus)
        } else if self.eat_keyword("typeof") {
            Some(UnaryOp::TypeOf)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        for (punct, delta) in [("++", 1.0), ("--", -1.0)] {
            if self.eat(punct) {
                let target = self.unary()?;
                if !is_assignable(&target) {
                    return Err(self.error("Invalid update target"));
                }
                return Ok(Expr::Update {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                });
            }
        }

        for keyword in ["new", "function", "delete", "void", "await"] {
            if self.check_keyword(keyword) {
                return Err(self.unsupported(&format!("'{keyword}' expression")));
            }
        }

        self.postfix()
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.eat(".") {
                let property = self.identifier()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat("?.") {
                if self.eat("[") {
                    let index = self.expression()?;
                    self.expect("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    };
                } else {
                    let property = self.identifier()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }

        for (punct, delta) in [("++", 1.0), ("--", -1.0)] {
            if self.check(punct) && is_assignable(&expr) {
                self.pos += 1;
                return Ok(Expr::Update {
                    target: Box::new(expr),
                    delta,
                    prefix: false,
                });
            }
        }

        Ok(expr)
    }

    fn arguments(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(")") {
            args.push(self.assignment()?);
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        let Some(token) = self.advance() else {
            return Err(self.error("Unexpected end of input"));
        };

        match token {
            Token::Number(n) => Ok(Expr::Literal(number_literal(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect(")")?;
                Ok(expr)
            }
            Token::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat("]") {
                    items.push(self.assignment()?);
                    if !self.eat(",") {
                        self.expect("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct("{") => self.object_literal(),
            _ => {
                self.pos -= 1;
                Err(self.error("Unexpected token"))
            }
        }
    }

    fn object_literal(&mut self) -> EvalResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat("}") {
            let key = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(Token::Str(s)) => s,
                Some(Token::Number(n)) => crate::evaluator::format_number(n),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("Expected property name"));
                }
            };
            let value = if self.eat(":") {
                self.assignment()?
            } else {
                // Shorthand `{ title }`
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(token: &Token) -> Option<(u8, Operator)> {
    let Token::Punct(punct) = token else {
        return None;
    };
    let entry = match *punct {
        "??" => (1, Operator::Logical(LogicalOp::Nullish)),
        "||" => (2, Operator::Logical(LogicalOp::Or)),
        "&&" => (3, Operator::Logical(LogicalOp::And)),
        "==" => (4, Operator::Binary(BinaryOp::Eq)),
        "!=" => (4, Operator::Binary(BinaryOp::NotEq)),
        "===" => (4, Operator::Binary(BinaryOp::StrictEq)),
        "!==" => (4, Operator::Binary(BinaryOp::StrictNotEq)),
        "<" => (5, Operator::Binary(BinaryOp::Lt)),
        ">" => (5, Operator::Binary(BinaryOp::Gt)),
        "<=" => (5, Operator::Binary(BinaryOp::LtEq)),
        ">=" => (5, Operator::Binary(BinaryOp::GtEq)),
        "+" => (6, Operator::Binary(BinaryOp::Add)),
        "-" => (6, Operator::Binary(BinaryOp::Sub)),
        "*" => (7, Operator::Binary(BinaryOp::Mul)),
        "/" => (7, Operator::Binary(BinaryOp::Div)),
        "%" => (7, Operator::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(entry)
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident(_)
            | Expr::Member {
                optional: false,
                ..
            }
            | Expr::Index {
                optional: false,
                ..
            }
    )
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => crate::evaluator::format_number(*n),
        Token::Str(s) => format!("'{s}'"),
        Token::Ident(name) => format!("'{name}'"),
        Token::Punct(p) => format!("'{p}'"),
    }
}

/// Integral literals are stored as integers so they print without a
/// fractional part.
pub(crate) fn number_literal(n: f64) -> Value {
    super::value::number(n)
}
