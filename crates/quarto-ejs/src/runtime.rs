/*
 * runtime.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Program execution.
//!
//! A [`Program`] is flat, but statement fragments may open and close blocks
//! across tags (`<% for (const x of xs) { %> ... <% } %>`). Before running,
//! the instructions are structured into a tree using the evaluator's
//! statement classification; each include scope must contain balanced
//! blocks, the same way a function body must.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::diagnostics::annotate;
use crate::error::{EvalError, EvalResult, TemplateError, TemplateResult};
use crate::evaluator::{
    BlockHeader, ExpressionEvaluator, Scope, Statement, is_truthy, iterate_keys, iterate_values,
};
use crate::options::{CompileOptions, EscapeFn};
use crate::program::{Instruction, Program, ScopeEntry, SourceOrigin};

/// A block of output diverted by `includeAt` / `endAt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedBlock {
    /// The captured output.
    pub html: String,
    /// The evaluated `includeAt` params.
    pub params: Value,
}

/// Result of rendering a compiled template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub output: String,
    pub extracted_blocks: Vec<ExtractedBlock>,
}

/// Run `program` against `data`.
///
/// `origin` is the source of the top-level template, used for error context.
pub(crate) fn execute(
    program: &Program,
    origin: &Arc<SourceOrigin>,
    data: &Value,
    options: &CompileOptions,
    evaluator: &dyn ExpressionEvaluator,
) -> TemplateResult<RenderOutput> {
    let nodes = structure(program.instructions(), evaluator)?;

    let globals = match &options.evaluation_scope {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let mut vars = Map::new();
    vars.insert("locals".to_string(), data.clone());
    if options.strict_locals_scope {
        if let Value::Object(map) = data {
            vars.extend(map.clone());
        }
    }
    let mut scope = Scope::new(globals);
    scope.push_function(vars, false);

    let mut runtime = Runtime {
        evaluator,
        escape: options.escape,
        diagnostics: options.compile_diagnostics,
        output: String::new(),
        capture: None,
        blocks: Vec::new(),
        line: 1,
        origins: vec![Arc::clone(origin)],
    };
    runtime.run(&nodes, &mut scope)?;

    if runtime.capture.is_some() {
        return Err(EvalError::UnbalancedBlock {
            message: "includeAt without a matching endAt".to_string(),
        }
        .into());
    }

    Ok(RenderOutput {
        output: runtime.output,
        extracted_blocks: runtime.blocks,
    })
}

// Structuring

#[derive(Debug)]
enum Node<'p> {
    Step(&'p Instruction),
    Exec(&'p str),
    Scope {
        entry: &'p ScopeEntry,
        body: Vec<Node<'p>>,
    },
    If {
        /// `None` condition for the final `else`.
        branches: Vec<(Option<String>, Vec<Node<'p>>)>,
    },
    Loop {
        header: BlockHeader,
        body: Vec<Node<'p>>,
    },
}

/// What ended a run of nodes.
enum Stop {
    End,
    ExitScope,
    Close,
    Else(Option<String>),
}

fn structure<'p>(
    instructions: &'p [Instruction],
    evaluator: &dyn ExpressionEvaluator,
) -> EvalResult<Vec<Node<'p>>> {
    let mut builder = Builder {
        instructions,
        pos: 0,
        evaluator,
    };
    let (nodes, stop) = builder.nodes()?;
    match stop {
        Stop::End => Ok(nodes),
        Stop::Close => Err(unbalanced("'}' without an open block")),
        Stop::Else(_) => Err(unbalanced("'else' without 'if'")),
        Stop::ExitScope => Err(unbalanced("include scope closed twice")),
    }
}

struct Builder<'p, 'e> {
    instructions: &'p [Instruction],
    pos: usize,
    evaluator: &'e dyn ExpressionEvaluator,
}

impl<'p> Builder<'p, '_> {
    fn nodes(&mut self) -> EvalResult<(Vec<Node<'p>>, Stop)> {
        let instructions = self.instructions;
        let mut nodes = Vec::new();
        while let Some(instruction) = instructions.get(self.pos) {
            self.pos += 1;
            match instruction {
                Instruction::Exec(statement) => match self.evaluator.classify(statement) {
                    Statement::Simple => nodes.push(Node::Exec(statement)),
                    Statement::Open(BlockHeader::If { condition }) => {
                        nodes.push(self.if_chain(condition)?);
                    }
                    Statement::Open(header) => {
                        let body = self.block_body()?;
                        nodes.push(Node::Loop { header, body });
                    }
                    Statement::Else(condition) => return Ok((nodes, Stop::Else(condition))),
                    Statement::Close => return Ok((nodes, Stop::Close)),
                },
                Instruction::EnterScope(entry) => {
                    let (body, stop) = self.nodes()?;
                    if !matches!(stop, Stop::ExitScope) {
                        return Err(unbalanced("block left open at the end of an include"));
                    }
                    nodes.push(Node::Scope { entry, body });
                }
                Instruction::ExitScope => return Ok((nodes, Stop::ExitScope)),
                other => nodes.push(Node::Step(other)),
            }
        }
        Ok((nodes, Stop::End))
    }

    fn if_chain(&mut self, condition: String) -> EvalResult<Node<'p>> {
        let mut branches: Vec<(Option<String>, Vec<Node<'p>>)> = Vec::new();
        let mut condition = Some(condition);
        loop {
            let (body, stop) = self.nodes()?;
            let was_else = condition.is_none();
            branches.push((condition.take(), body));
            match stop {
                Stop::Close => return Ok(Node::If { branches }),
                Stop::Else(_) if was_else => return Err(unbalanced("'else' after 'else'")),
                Stop::Else(next) => condition = next,
                Stop::End | Stop::ExitScope => return Err(unbalanced("'if' block is not closed")),
            }
        }
    }

    fn block_body(&mut self) -> EvalResult<Vec<Node<'p>>> {
        let (body, stop) = self.nodes()?;
        match stop {
            Stop::Close => Ok(body),
            Stop::Else(_) => Err(unbalanced("'else' without 'if'")),
            Stop::End | Stop::ExitScope => Err(unbalanced("loop block is not closed")),
        }
    }
}

fn unbalanced(message: &str) -> EvalError {
    EvalError::UnbalancedBlock {
        message: message.to_string(),
    }
}

// Execution

struct Runtime<'e> {
    evaluator: &'e dyn ExpressionEvaluator,
    escape: EscapeFn,
    diagnostics: bool,
    output: String,
    /// Output saved while a capture is active, and the capture's params.
    capture: Option<(String, Value)>,
    blocks: Vec<ExtractedBlock>,
    line: usize,
    origins: Vec<Arc<SourceOrigin>>,
}

impl Runtime<'_> {
    fn run(&mut self, nodes: &[Node<'_>], scope: &mut Scope) -> TemplateResult<()> {
        for node in nodes {
            self.node(node, scope)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node<'_>, scope: &mut Scope) -> TemplateResult<()> {
        match node {
            Node::Step(instruction) => self.step(instruction, scope),
            Node::Exec(statement) => {
                let result = self.evaluator.execute(statement, scope);
                self.check(result)
            }
            Node::Scope { entry, body } => self.scoped(entry, body, scope),
            Node::If { branches } => {
                let line = self.line;
                for (condition, body) in branches {
                    let taken = match condition {
                        Some(condition) => {
                            self.line = line;
                            is_truthy(&self.evaluate(condition, scope)?)
                        }
                        None => true,
                    };
                    if taken {
                        return self.block(body, scope, Scope::push_block);
                    }
                }
                Ok(())
            }
            Node::Loop { header, body } => self.repeat(header, body, scope),
        }
    }

    fn step(&mut self, instruction: &Instruction, scope: &mut Scope) -> TemplateResult<()> {
        match instruction {
            Instruction::Append(text) => self.output.push_str(text),
            Instruction::AppendEscaped(expression) => {
                let value = self.evaluate(expression, scope)?;
                let text = (self.escape)(&self.evaluator.to_output(&value));
                self.output.push_str(&text);
            }
            Instruction::AppendRaw(expression) => {
                let value = self.evaluate(expression, scope)?;
                let text = self.evaluator.to_output(&value);
                self.output.push_str(&text);
            }
            Instruction::Line(line) => self.line = *line,
            Instruction::BeginCapture { params } => {
                if self.capture.is_some() {
                    return Err(self.fail(EvalError::NestedExtraction));
                }
                let params = self.evaluate(params, scope)?;
                let main = std::mem::take(&mut self.output);
                self.capture = Some((main, params));
            }
            Instruction::EndCapture => {
                let Some((main, params)) = self.capture.take() else {
                    return Err(self.fail(EvalError::UnmatchedEndExtraction));
                };
                let html = std::mem::replace(&mut self.output, main);
                tracing::trace!(bytes = html.len(), "Extracted block");
                self.blocks.push(ExtractedBlock { html, params });
            }
            // Structured before execution
            Instruction::Exec(_) | Instruction::EnterScope(_) | Instruction::ExitScope => {}
        }
        Ok(())
    }

    /// Run an include body in its own function scope.
    fn scoped(
        &mut self,
        entry: &ScopeEntry,
        body: &[Node<'_>],
        scope: &mut Scope,
    ) -> TemplateResult<()> {
        let mut vars = Map::new();
        for params in &entry.params {
            if let Value::Object(map) = self.evaluate(params, scope)? {
                vars.extend(map);
            }
        }
        if entry.isolated && !vars.contains_key("locals") {
            let locals = Value::Object(vars.clone());
            vars.insert("locals".to_string(), locals);
        }

        let depth = scope.depth();
        let line = self.line;
        scope.push_function(vars, entry.isolated);
        if let Some(origin) = &entry.origin {
            self.origins.push(Arc::clone(origin));
            self.line = 1;
        }

        let result = self.run(body, scope);

        scope.truncate(depth);
        if entry.origin.is_some() {
            self.origins.pop();
            self.line = line;
        }
        result
    }

    fn block(
        &mut self,
        body: &[Node<'_>],
        scope: &mut Scope,
        open: impl FnOnce(&mut Scope),
    ) -> TemplateResult<()> {
        let depth = scope.depth();
        open(scope);
        let result = self.run(body, scope);
        scope.truncate(depth);
        result
    }

    fn repeat(
        &mut self,
        header: &BlockHeader,
        body: &[Node<'_>],
        scope: &mut Scope,
    ) -> TemplateResult<()> {
        let line = self.line;
        match header {
            BlockHeader::If { condition } => {
                if is_truthy(&self.evaluate(condition, scope)?) {
                    self.block(body, scope, Scope::push_block)?;
                }
                Ok(())
            }
            BlockHeader::While { condition } => loop {
                self.line = line;
                if !is_truthy(&self.evaluate(condition, scope)?) {
                    return Ok(());
                }
                self.block(body, scope, Scope::push_block)?;
            },
            BlockHeader::ForOf { binding, iterable } => {
                let value = self.evaluate(iterable, scope)?;
                let items = self.check(iterate_values(&value))?;
                self.each_binding(binding, items, body, line, scope)
            }
            BlockHeader::ForIn { binding, object } => {
                let value = self.evaluate(object, scope)?;
                self.each_binding(binding, iterate_keys(&value), body, line, scope)
            }
            BlockHeader::For {
                init,
                condition,
                update,
            } => {
                let depth = scope.depth();
                scope.push_block();
                let result = self.counted(init, condition, update, body, line, scope);
                scope.truncate(depth);
                result
            }
            BlockHeader::ForEach {
                iterable,
                item,
                index,
            } => {
                let items = match self.evaluate(iterable, scope)? {
                    Value::Array(items) => items,
                    Value::Null => {
                        return Err(self.fail(EvalError::type_error(
                            "Cannot read properties of undefined (reading 'forEach')",
                        )));
                    }
                    _ => {
                        return Err(self.fail(EvalError::type_error(format!(
                            "{iterable}.forEach is not a function"
                        ))));
                    }
                };
                for (position, value) in items.into_iter().enumerate() {
                    self.line = line;
                    // The callback body is a function scope of its own
                    self.block(body, scope, |scope| {
                        let mut vars = Map::new();
                        vars.insert(item.clone(), value);
                        if let Some(index) = index {
                            vars.insert(index.clone(), Value::from(position));
                        }
                        scope.push_function(vars, false);
                    })?;
                }
                Ok(())
            }
        }
    }

    fn each_binding(
        &mut self,
        binding: &str,
        values: Vec<Value>,
        body: &[Node<'_>],
        line: usize,
        scope: &mut Scope,
    ) -> TemplateResult<()> {
        for value in values {
            self.line = line;
            self.block(body, scope, |scope| {
                scope.push_block();
                scope.declare(binding, value);
            })?;
        }
        Ok(())
    }

    /// `for (init; condition; update) { ... }`
    fn counted(
        &mut self,
        init: &Option<String>,
        condition: &Option<String>,
        update: &Option<String>,
        body: &[Node<'_>],
        line: usize,
        scope: &mut Scope,
    ) -> TemplateResult<()> {
        if let Some(init) = init {
            let result = self.evaluator.execute(init, scope);
            self.check(result)?;
        }
        loop {
            self.line = line;
            if let Some(condition) = condition {
                if !is_truthy(&self.evaluate(condition, scope)?) {
                    return Ok(());
                }
            }
            self.block(body, scope, Scope::push_block)?;
            if let Some(update) = update {
                self.line = line;
                let result = self.evaluator.execute(update, scope);
                self.check(result)?;
            }
        }
    }

    fn evaluate(&mut self, expression: &str, scope: &mut Scope) -> TemplateResult<Value> {
        let result = self.evaluator.evaluate(expression, scope);
        self.check(result)
    }

    fn check<T>(&self, result: EvalResult<T>) -> TemplateResult<T> {
        result.map_err(|err| self.fail(err))
    }

    /// Attach the current file and line to an evaluation failure.
    fn fail(&self, err: EvalError) -> TemplateError {
        match self.origins.last() {
            Some(origin) if self.diagnostics => {
                annotate(&origin.filename, &origin.text, self.line, err)
            }
            _ => TemplateError::Evaluation(err),
        }
    }
}
