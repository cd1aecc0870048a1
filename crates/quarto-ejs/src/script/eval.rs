/*
 * eval.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-walking interpreter for parsed fragments.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::HostFunction;
use super::parser::{BinaryOp, DeclKind, Expr, LogicalOp, Stmt, UnaryOp};
use super::value::{
    add, compare, get_index, get_property, loose_equals, number, property_key, set_index,
    strict_equals, to_js_string, to_number, type_of,
};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{Scope, display_value, is_truthy, iterate_keys, iterate_values};

/// Namespaces resolved when no binding of the same name shadows them.
const STATIC_NAMESPACES: &[&str] = &["JSON", "Math", "Object", "Array"];

pub(crate) struct Interpreter<'f> {
    functions: &'f HashMap<String, HostFunction>,
}

impl<'f> Interpreter<'f> {
    pub(crate) fn new(functions: &'f HashMap<String, HostFunction>) -> Self {
        Self { functions }
    }

    // Statements

    pub(crate) fn exec(&self, stmt: &Stmt, scope: &mut Scope) -> EvalResult<()> {
        match stmt {
            Stmt::Empty => Ok(()),
            Stmt::Expr(expr) => self.eval(expr, scope).map(|_| ()),
            Stmt::Declare { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(init) => self.eval(init, scope)?,
                        // `var x;` keeps an existing binding
                        None if *kind == DeclKind::Var && scope.contains(name) => continue,
                        None => Value::Null,
                    };
                    match kind {
                        DeclKind::Var => scope.declare_var(name.clone(), value),
                        DeclKind::Let | DeclKind::Const => scope.declare(name.clone(), value),
                    }
                }
                Ok(())
            }
            Stmt::Block(statements) => self.in_block(scope, |this, scope| {
                statements.iter().try_for_each(|s| this.exec(s, scope))
            }),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if is_truthy(&self.eval(test, scope)?) {
                    self.exec(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, scope)
                } else {
                    Ok(())
                }
            }
            Stmt::While { test, body } => {
                while is_truthy(&self.eval(test, scope)?) {
                    self.exec(body, scope)?;
                }
                Ok(())
            }
            Stmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                let items = iterate_values(&self.eval(iterable, scope)?)?;
                self.each_binding(binding, items, body, scope)
            }
            Stmt::ForIn {
                binding,
                object,
                body,
            } => {
                let keys = iterate_keys(&self.eval(object, scope)?);
                self.each_binding(binding, keys, body, scope)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.in_block(scope, |this, scope| {
                if let Some(init) = init {
                    this.exec(init, scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !is_truthy(&this.eval(test, scope)?) {
                            break;
                        }
                    }
                    this.exec(body, scope)?;
                    if let Some(update) = update {
                        this.eval(update, scope)?;
                    }
                }
                Ok(())
            }),
        }
    }

    fn each_binding(
        &self,
        binding: &str,
        values: Vec<Value>,
        body: &Stmt,
        scope: &mut Scope,
    ) -> EvalResult<()> {
        for value in values {
            self.in_block(scope, |this, scope| {
                scope.declare(binding, value);
                this.exec(body, scope)
            })?;
        }
        Ok(())
    }

    fn in_block<T>(
        &self,
        scope: &mut Scope,
        body: impl FnOnce(&Self, &mut Scope) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let depth = scope.depth();
        scope.push_block();
        let result = body(self, scope);
        scope.truncate(depth);
        result
    }

    // Expressions

    pub(crate) fn eval(&self, expr: &Expr, scope: &mut Scope) -> EvalResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedName { name: name.clone() }),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let value = self.eval(value, scope)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => {
                Ok(self.chain(expr, scope)?.unwrap_or(Value::Null))
            }
            Expr::Unary { op, operand } => self.unary(*op, operand, scope),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuits = match op {
                    LogicalOp::And => !is_truthy(&left),
                    LogicalOp::Or => is_truthy(&left),
                    LogicalOp::Nullish => !left.is_null(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if is_truthy(&self.eval(test, scope)?) {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { target, op, value } => {
                let value = match op {
                    Some(op) => {
                        let current = self.eval(target, scope)?;
                        let rhs = self.eval(value, scope)?;
                        binary(*op, &current, &rhs)
                    }
                    None => self.eval(value, scope)?,
                };
                self.assign(target, value.clone(), scope)?;
                Ok(value)
            }
            Expr::Update {
                target,
                delta,
                prefix,
            } => {
                let old = to_number(&self.eval(target, scope)?);
                let new = number(old + delta);
                self.assign(target, new.clone(), scope)?;
                Ok(if *prefix { new } else { number(old) })
            }
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Expr, scope: &mut Scope) -> EvalResult<Value> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = operand {
                if !scope.contains(name) {
                    return Ok(Value::String("undefined".to_string()));
                }
            }
        }
        let value = self.eval(operand, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!is_truthy(&value)),
            UnaryOp::Neg => number(-to_number(&value)),
            UnaryOp::Plus => number(to_number(&value)),
            UnaryOp::TypeOf => Value::String(type_of(&value).to_string()),
        })
    }

    /// Evaluate a member/index/call chain. `None` means an optional link
    /// short-circuited the rest of the chain.
    fn chain(&self, expr: &Expr, scope: &mut Scope) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if let Some(value) = self.static_property(object, property, scope) {
                    return Ok(Some(value));
                }
                let Some(object) = self.chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && object.is_null() {
                    return Ok(None);
                }
                get_property(&object, property).map(Some)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(object) = self.chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && object.is_null() {
                    return Ok(None);
                }
                let index = self.eval(index, scope)?;
                if object.is_null() {
                    return Err(EvalError::type_error(format!(
                        "Cannot read properties of undefined (reading '{}')",
                        property_key(&index)
                    )));
                }
                get_index(&object, &index).map(Some)
            }
            Expr::Call { callee, args } => self.call(callee, args, scope),
            other => self.eval(other, scope).map(Some),
        }
    }

    fn call(&self, callee: &Expr, args: &[Expr], scope: &mut Scope) -> EvalResult<Option<Value>> {
        match callee {
            Expr::Ident(name) => {
                let args = self.arguments(args, scope)?;
                self.call_function(name, &args, scope).map(Some)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if let Some(value) = self.mutating_call(object, property, args, scope)? {
                    return Ok(Some(value));
                }
                if let Expr::Ident(namespace) = object.as_ref() {
                    if self.is_static_namespace(namespace, scope) {
                        let args = self.arguments(args, scope)?;
                        return static_call(namespace, property, &args).map(Some);
                    }
                }
                let Some(receiver) = self.chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && receiver.is_null() {
                    return Ok(None);
                }
                let args = self.arguments(args, scope)?;
                method_call(&receiver, property, &args).map(Some)
            }
            _ => Err(EvalError::type_error("expression is not a function")),
        }
    }

    fn arguments(&self, args: &[Expr], scope: &mut Scope) -> EvalResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }

    fn call_function(&self, name: &str, args: &[Value], scope: &Scope) -> EvalResult<Value> {
        if let Some(function) = self.functions.get(name) {
            return function(args).map_err(|message| EvalError::Function {
                name: name.to_string(),
                message,
            });
        }
        if scope.contains(name) {
            return Err(EvalError::type_error(format!("{name} is not a function")));
        }
        let first = args.first().unwrap_or(&Value::Null);
        match name {
            "String" => Ok(Value::String(if args.is_empty() {
                String::new()
            } else {
                to_js_string(first)
            })),
            "Number" => Ok(if args.is_empty() {
                Value::from(0)
            } else {
                number(to_number(first))
            }),
            "Boolean" => Ok(Value::Bool(is_truthy(first))),
            "parseInt" => {
                let radix = args.get(1).map(to_number);
                Ok(parse_int(&to_js_string(first), radix))
            }
            "parseFloat" => Ok(parse_float(&to_js_string(first))),
            "isNaN" => Ok(Value::Bool(to_number(first).is_nan())),
            _ => Err(EvalError::UndefinedName {
                name: name.to_string(),
            }),
        }
    }

    /// `xs.push(..)` and friends, which modify the array in place.
    fn mutating_call(
        &self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        scope: &mut Scope,
    ) -> EvalResult<Option<Value>> {
        if !matches!(method, "push" | "pop" | "shift" | "unshift") {
            return Ok(None);
        }
        let Some((root, keys)) = self.place(object, scope)? else {
            return Ok(None);
        };
        let args = self.arguments(args, scope)?;
        let Some(Value::Array(items)) = resolve_mut(scope, &root, &keys) else {
            return Ok(None);
        };
        let result = match method {
            "push" => {
                items.extend(args);
                Value::from(items.len())
            }
            "unshift" => {
                let tail = std::mem::replace(items, args);
                items.extend(tail);
                Value::from(items.len())
            }
            "pop" => items.pop().unwrap_or(Value::Null),
            _ => {
                if items.is_empty() {
                    Value::Null
                } else {
                    items.remove(0)
                }
            }
        };
        Ok(Some(result))
    }

    fn is_static_namespace(&self, name: &str, scope: &Scope) -> bool {
        STATIC_NAMESPACES.contains(&name) && !scope.contains(name)
    }

    fn static_property(&self, object: &Expr, property: &str, scope: &Scope) -> Option<Value> {
        let Expr::Ident(namespace) = object else {
            return None;
        };
        if namespace != "Math" || !self.is_static_namespace(namespace, scope) {
            return None;
        }
        match property {
            "PI" => Some(number(std::f64::consts::PI)),
            "E" => Some(number(std::f64::consts::E)),
            _ => None,
        }
    }

    fn assign(&self, target: &Expr, value: Value, scope: &mut Scope) -> EvalResult<()> {
        let Some((root, keys)) = self.place(target, scope)? else {
            return Err(EvalError::type_error("Invalid assignment target"));
        };
        let Some((last, parents)) = keys.split_last() else {
            scope.assign(&root, value);
            return Ok(());
        };
        if let Some(parent) = resolve_mut(scope, &root, parents) {
            return set_index(parent, last, value);
        }
        if scope.contains(&root) {
            return Err(EvalError::type_error(format!(
                "Cannot set properties of undefined (setting '{}')",
                property_key(last)
            )));
        }
        Err(EvalError::UndefinedName { name: root })
    }

    /// Root binding and key path of an assignable expression, or `None` when
    /// the expression is not rooted at a name.
    fn place(&self, expr: &Expr, scope: &mut Scope) -> EvalResult<Option<(String, Vec<Value>)>> {
        match expr {
            Expr::Ident(name) => Ok(Some((name.clone(), Vec::new()))),
            Expr::Member {
                object, property, ..
            } => Ok(self.place(object, scope)?.map(|(root, mut keys)| {
                keys.push(Value::String(property.clone()));
                (root, keys)
            })),
            Expr::Index { object, index, .. } => {
                let Some((root, mut keys)) = self.place(object, scope)? else {
                    return Ok(None);
                };
                keys.push(self.eval(index, scope)?);
                Ok(Some((root, keys)))
            }
            _ => Ok(None),
        }
    }
}

fn resolve_mut<'s>(scope: &'s mut Scope, root: &str, keys: &[Value]) -> Option<&'s mut Value> {
    let mut target = scope.get_mut(root)?;
    for key in keys {
        target = match target {
            Value::Object(map) => map.get_mut(&property_key(key))?,
            Value::Array(items) => items.get_mut(super::value::array_index(key)?)?,
            _ => return None,
        };
    }
    Some(target)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let arithmetic = |f: fn(f64, f64) -> f64| number(f(to_number(left), to_number(right)));
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => arithmetic(|a, b| a - b),
        BinaryOp::Mul => arithmetic(|a, b| a * b),
        BinaryOp::Div => arithmetic(|a, b| a / b),
        BinaryOp::Rem => arithmetic(|a, b| a % b),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    }
}

fn static_call(namespace: &str, name: &str, args: &[Value]) -> EvalResult<Value> {
    let first = args.first().unwrap_or(&Value::Null);
    let numbers = || args.iter().map(to_number);
    let result = match (namespace, name) {
        ("JSON", "stringify") => {
            let pretty = args.get(2).is_some_and(|indent| to_number(indent) > 0.0);
            let text = if pretty {
                serde_json::to_string_pretty(first)
            } else {
                serde_json::to_string(first)
            };
            Value::String(text.map_err(|e| function_error("JSON.stringify", e))?)
        }
        ("JSON", "parse") => serde_json::from_str::<Value>(&to_js_string(first))
            .map_err(|e| function_error("JSON.parse", e))?,
        ("Math", "floor") => number(to_number(first).floor()),
        ("Math", "ceil") => number(to_number(first).ceil()),
        ("Math", "round") => number((to_number(first) + 0.5).floor()),
        ("Math", "trunc") => number(to_number(first).trunc()),
        ("Math", "abs") => number(to_number(first).abs()),
        ("Math", "sqrt") => number(to_number(first).sqrt()),
        ("Math", "pow") => number(to_number(first).powf(args.get(1).map_or(f64::NAN, to_number))),
        ("Math", "max") => number(numbers().fold(f64::NEG_INFINITY, f64::max)),
        ("Math", "min") => number(numbers().fold(f64::INFINITY, f64::min)),
        ("Object", "keys") => Value::Array(match first {
            Value::Object(_) | Value::Array(_) | Value::String(_) => iterate_keys(first),
            _ => Vec::new(),
        }),
        ("Object", "values") => Value::Array(match first {
            Value::Object(map) => map.values().cloned().collect(),
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        }),
        ("Object", "entries") => Value::Array(match first {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
            _ => Vec::new(),
        }),
        ("Array", "isArray") => Value::Bool(first.is_array()),
        _ => {
            return Err(EvalError::type_error(format!(
                "{namespace}.{name} is not a function"
            )));
        }
    };
    Ok(result)
}

fn method_call(receiver: &Value, name: &str, args: &[Value]) -> EvalResult<Value> {
    let result = match receiver {
        Value::String(s) => {
            check_string_length(s, name, args)?;
            string_method(s, name, args)
        }
        Value::Array(items) => array_method(items, name, args),
        Value::Number(n) => number_method(n.as_f64().unwrap_or(f64::NAN), name, args),
        Value::Object(map) if name == "hasOwnProperty" => Some(Value::Bool(
            map.contains_key(&property_key(args.first().unwrap_or(&Value::Null))),
        )),
        Value::Null => {
            return Err(EvalError::type_error(format!(
                "Cannot read properties of undefined (reading '{name}')"
            )));
        }
        _ => None,
    };
    match result {
        Some(value) => Ok(value),
        None if name == "toString" => Ok(Value::String(display_value(receiver))),
        None => Err(EvalError::type_error(format!(
            "{}.{name} is not a function",
            type_of(receiver)
        ))),
    }
}

/// Longest string `repeat` and `padStart` / `padEnd` may build, in chars.
const MAX_STRING_LENGTH: f64 = 536_870_888.0;

fn check_string_length(s: &str, name: &str, args: &[Value]) -> EvalResult<()> {
    let length = match name {
        "repeat" => {
            let count = args.first().map_or(0.0, to_number);
            if count.is_infinite() {
                return Err(function_error(name, "Invalid count value: Infinity"));
            }
            if count.is_nan() || count <= 0.0 || s.is_empty() {
                return Ok(());
            }
            count.trunc() * s.chars().count() as f64
        }
        "padStart" | "padEnd" => {
            let fill_is_empty = matches!(args.get(1), Some(fill) if to_js_string(fill).is_empty());
            if fill_is_empty {
                return Ok(());
            }
            args.first().map_or(0.0, to_number)
        }
        _ => return Ok(()),
    };
    if length > MAX_STRING_LENGTH {
        return Err(function_error(name, "Invalid string length"));
    }
    Ok(())
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).map(to_js_string);
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let substring = |start: usize, end: usize| -> Value {
        if start >= end {
            Value::String(String::new())
        } else {
            Value::String(chars[start..end].iter().collect())
        }
    };
    let value = match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "includes" => Value::Bool(s.contains(arg(0)?.as_str())),
        "startsWith" => Value::Bool(s.starts_with(arg(0)?.as_str())),
        "endsWith" => Value::Bool(s.ends_with(arg(0)?.as_str())),
        "indexOf" => {
            let needle = arg(0)?;
            match s.find(needle.as_str()) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::from(-1),
            }
        }
        "split" => match args.first() {
            None | Some(Value::Null) => Value::Array(vec![Value::String(s.to_string())]),
            Some(separator) => {
                let separator = to_js_string(separator);
                let parts: Vec<Value> = if separator.is_empty() {
                    chars.iter().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(separator.as_str())
                        .map(|p| Value::String(p.to_string()))
                        .collect()
                };
                Value::Array(parts)
            }
        },
        "slice" => {
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            substring(start, end)
        }
        "substring" => {
            let clamp = |v: Option<&Value>, default: usize| match v {
                None | Some(Value::Null) => default,
                Some(v) => {
                    let n = to_number(v);
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            substring(a.min(b), a.max(b))
        }
        "charAt" => {
            let i = args.first().map_or(0.0, to_number);
            let c = if i >= 0.0 { chars.get(i as usize) } else { None };
            Value::String(c.map(char::to_string).unwrap_or_default())
        }
        "replace" => Value::String(s.replacen(arg(0)?.as_str(), &arg(1).unwrap_or_default(), 1)),
        "replaceAll" => Value::String(s.replace(arg(0)?.as_str(), &arg(1).unwrap_or_default())),
        "repeat" => {
            let count = args.first().map_or(0.0, to_number);
            if count.is_nan() || count < 0.0 {
                return None;
            }
            Value::String(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let target = args.first().map_or(0.0, to_number);
            let fill = arg(1).unwrap_or_else(|| " ".to_string());
            let missing = if target > len as f64 { target as usize - len } else { 0 };
            let padding: String = fill.chars().cycle().take(missing).collect();
            if fill.is_empty() {
                Value::String(s.to_string())
            } else if name == "padStart" {
                Value::String(padding + s)
            } else {
                Value::String(s.to_string() + &padding)
            }
        }
        "concat" => Value::String(args.iter().fold(s.to_string(), |acc, a| acc + &to_js_string(a))),
        "toString" => Value::String(s.to_string()),
        _ => return None,
    };
    Some(value)
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> Option<Value> {
    let first = args.first().unwrap_or(&Value::Null);
    let value = match name {
        "join" => {
            let separator = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(separator) => to_js_string(separator),
            };
            Value::String(
                items
                    .iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "includes" => Value::Bool(items.iter().any(|item| strict_equals(item, first))),
        "indexOf" => Value::from(
            items
                .iter()
                .position(|item| strict_equals(item, first))
                .map_or(-1, |i| i as i64),
        ),
        "slice" => {
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            Value::Array(if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            })
        }
        "concat" => {
            let mut joined = items.to_vec();
            for arg in args {
                match arg {
                    Value::Array(more) => joined.extend(more.iter().cloned()),
                    other => joined.push(other.clone()),
                }
            }
            Value::Array(joined)
        }
        _ => return None,
    };
    Some(value)
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "toFixed" => {
            let digits = args.first().map_or(0.0, to_number);
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Some(Value::String(format!("{n:.digits$}")))
        }
        "toString" => Some(Value::String(crate::evaluator::format_number(n))),
        _ => None,
    }
}

/// Resolve a `slice` bound: negative values count from the end.
fn relative_index(arg: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(arg) = arg.filter(|a| !a.is_null()) else {
        return default;
    };
    let n = to_number(arg).trunc();
    if n.is_nan() {
        0
    } else if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn parse_int(text: &str, radix: Option<f64>) -> Value {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));
    let radix = radix.filter(|r| !r.is_nan() && *r != 0.0);
    let (radix, digits) = match (radix, hex) {
        (None, Some(rest)) => (16, rest),
        (Some(r), Some(rest)) if r == 16.0 => (16, rest),
        (None, None) => (10, digits),
        (Some(r), _) => {
            if !(2.0..=36.0).contains(&r) {
                return Value::Null;
            }
            (r as u32, digits)
        }
    };
    let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&prefix, radix) {
        Ok(n) => Value::from(if negative { -n } else { n }),
        Err(_) => Value::Null,
    }
}

fn parse_float(text: &str) -> Value {
    let text = text.trim_start();
    // Longest prefix that parses as a number
    let end = (1..=text.len())
        .rev()
        .filter(|&i| text.is_char_boundary(i))
        .find(|&i| {
            let candidate = &text[..i];
            !candidate.ends_with(['e', 'E', '+', '-']) && candidate.parse::<f64>().is_ok()
        });
    match end {
        Some(end) => text[..end].parse::<f64>().map_or(Value::Null, number),
        None => Value::Null,
    }
}

fn function_error(name: &str, error: impl std::fmt::Display) -> EvalError {
    EvalError::Function {
        name: name.to_string(),
        message: error.to_string(),
    }
}
