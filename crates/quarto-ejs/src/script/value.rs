/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JavaScript value semantics over `serde_json::Value`.
//!
//! `null` stands in for both `null` and `undefined`. Numbers that are not
//! representable in JSON (NaN, infinities) become `null` when stored.

use serde_json::{Number, Value};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{display_value, format_number};

/// Largest integer an `f64` holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        // -0 prints as 0
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

pub(crate) fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => f64::NAN,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(single),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

/// `String(value)`
pub(crate) fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "undefined".to_string(),
        other => display_value(other),
    }
}

pub(crate) fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

/// `===`
pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// `==`
pub(crate) fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => {
            let (x, y) = (to_number(a), to_number(b));
            x == y
        }
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            to_number(a) == to_number(b)
        }
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_))
        | (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            to_js_string(a) == to_js_string(b)
        }
        _ => strict_equals(a, b),
    }
}

/// `<`, `>`, `<=`, `>=` as an ordering; `None` when incomparable (NaN).
pub(crate) fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// `+`: string concatenation when either side is not a primitive number.
pub(crate) fn add(a: &Value, b: &Value) -> Value {
    let concatenates = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
    if concatenates(a) || concatenates(b) {
        Value::String(to_js_string(a) + &to_js_string(b))
    } else {
        number(to_number(a) + to_number(b))
    }
}

/// Key used when a value indexes an object.
pub(crate) fn property_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_default(),
        other => to_js_string(other),
    }
}

/// Array position for an index value, if it is a non-negative integer.
pub(crate) fn array_index(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// `value.name`
pub(crate) fn get_property(value: &Value, name: &str) -> EvalResult<Value> {
    match value {
        Value::Null => Err(EvalError::type_error(format!(
            "Cannot read properties of undefined (reading '{name}')"
        ))),
        Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
        Value::Array(items) => Ok(name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

/// `value[index]`
pub(crate) fn get_index(value: &Value, index: &Value) -> EvalResult<Value> {
    match value {
        Value::Array(items) => Ok(match array_index(index) {
            Some(i) => items.get(i).cloned().unwrap_or(Value::Null),
            None => get_property(value, &property_key(index))?,
        }),
        Value::String(s) => Ok(match array_index(index) {
            Some(i) => s
                .chars()
                .nth(i)
                .map_or(Value::Null, |c| Value::String(c.to_string())),
            None => get_property(value, &property_key(index))?,
        }),
        _ => get_property(value, &property_key(index)),
    }
}

/// `target.name = value`
pub(crate) fn set_property(target: &mut Value, name: String, value: Value) -> EvalResult<()> {
    match target {
        Value::Object(map) => {
            map.insert(name, value);
            Ok(())
        }
        Value::Array(_) => {
            let index = Value::String(name);
            set_index(target, &index, value)
        }
        other => Err(EvalError::type_error(format!(
            "Cannot set properties of {} (setting '{name}')",
            type_of(other)
        ))),
    }
}

/// `target[index] = value`
pub(crate) fn set_index(target: &mut Value, index: &Value, value: Value) -> EvalResult<()> {
    if let Value::Array(items) = target {
        let Some(i) = array_index(index) else {
            return Err(EvalError::type_error(format!(
                "Invalid array index {}",
                to_js_string(index)
            )));
        };
        if i >= items.len() {
            items.resize(i + 1, Value::Null);
        }
        items[i] = value;
        return Ok(());
    }
    set_property(target, property_key(index), value)
}
