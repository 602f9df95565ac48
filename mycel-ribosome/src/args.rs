//! Argument coercion at the script boundary
//!
//! Scripts pass arbitrary values; every host function declares an ordered
//! list of `ArgSpec`s and `coerce` maps each value into the small typed
//! domain the dispatcher works with. Mismatches become `ArgError`s carrying
//! the position and expected type.

use crate::error::RibosomeError;
use mycel_model::Hash;
use serde_json::Value;

/// The typed domain a script value may be coerced into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Hash,
    Int,
    Bool,
    /// String or object; objects are re-serialized to their JSON text
    Entry,
    Map,
    /// Like Entry, for opaque call arguments
    Args,
    /// Stringify anything
    ToStr,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
    pub optional: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, ty: ArgType) -> Self {
        Self { name, ty, optional: false }
    }

    pub const fn optional(name: &'static str, ty: ArgType) -> Self {
        Self { name, ty, optional: true }
    }
}

/// A coerced argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CoreValue {
    Str(String),
    Hash(Hash),
    Int(i64),
    Bool(bool),
    Map(serde_json::Map<String, Value>),
}

impl CoreValue {
    pub fn into_string(self) -> String {
        match self {
            CoreValue::Str(s) => s,
            CoreValue::Int(i) => i.to_string(),
            CoreValue::Bool(b) => b.to_string(),
            CoreValue::Hash(h) => h.to_string(),
            CoreValue::Map(m) => Value::Object(m).to_string(),
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn arg_err(spec: &ArgSpec, position: usize, expected: &str, got: &Value) -> RibosomeError {
    RibosomeError::ArgError {
        position,
        name: spec.name.to_string(),
        expected: expected.to_string(),
        got: type_name(got).to_string(),
    }
}

/// Check the count of supplied values against the spec list
pub fn check_arg_count(specs: &[ArgSpec], got: usize) -> Result<(), RibosomeError> {
    let required = specs.iter().filter(|s| !s.optional).count();
    if got < required || got > specs.len() {
        let expected = if required == specs.len() {
            required.to_string()
        } else {
            format!("{}..{}", required, specs.len())
        };
        return Err(RibosomeError::ArgCount { expected, got });
    }
    Ok(())
}

/// Coerce one script value per its declared type. `position` is 1-based, the
/// way it reads in error messages.
pub fn coerce(spec: &ArgSpec, position: usize, v: &Value) -> Result<CoreValue, RibosomeError> {
    match spec.ty {
        ArgType::String => match v {
            Value::String(s) => Ok(CoreValue::Str(s.clone())),
            other => Err(arg_err(spec, position, "string", other)),
        },
        ArgType::Hash => match v {
            Value::String(s) => Ok(CoreValue::Hash(Hash::parse(s)?)),
            other => Err(arg_err(spec, position, "string", other)),
        },
        ArgType::Int => match v {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CoreValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 {
                        Ok(CoreValue::Int(f as i64))
                    } else {
                        Err(arg_err(spec, position, "int", v))
                    }
                } else {
                    Err(arg_err(spec, position, "int", v))
                }
            }
            other => Err(arg_err(spec, position, "int", other)),
        },
        ArgType::Bool => match v {
            Value::Bool(b) => Ok(CoreValue::Bool(*b)),
            other => Err(arg_err(spec, position, "boolean", other)),
        },
        ArgType::Entry | ArgType::Args => match v {
            Value::String(s) => Ok(CoreValue::Str(s.clone())),
            Value::Object(_) | Value::Array(_) => Ok(CoreValue::Str(v.to_string())),
            other => Err(arg_err(spec, position, "string or object", other)),
        },
        ArgType::Map => match v {
            Value::Object(m) => Ok(CoreValue::Map(m.clone())),
            other => Err(arg_err(spec, position, "object", other)),
        },
        ArgType::ToStr => match v {
            Value::String(s) => Ok(CoreValue::Str(s.clone())),
            Value::Object(_) | Value::Array(_) => Ok(CoreValue::Str(v.to_string())),
            other => Ok(CoreValue::Str(other.to_string())),
        },
    }
}

/// Read an integer option out of a script options object; scripts hand
/// masks over as either ints or whole floats depending on how they were
/// produced.
pub fn opt_int(m: &serde_json::Map<String, Value>, key: &str) -> Result<Option<i64>, RibosomeError> {
    match m.get(key) {
        None => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Ok(Some(f as i64))
                } else {
                    Err(bad_opt(key, "int", "float"))
                }
            } else {
                Err(bad_opt(key, "int", "number"))
            }
        }
        Some(other) => Err(bad_opt(key, "int", type_name(other))),
    }
}

pub fn opt_bool(m: &serde_json::Map<String, Value>, key: &str) -> Result<Option<bool>, RibosomeError> {
    match m.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(bad_opt(key, "boolean", type_name(other))),
    }
}

fn bad_opt(key: &str, expected: &str, got: &str) -> RibosomeError {
    RibosomeError::ArgError {
        position: 0,
        name: key.to_string(),
        expected: format!("{} {} attribute", expected, key),
        got: got.to_string(),
    }
}
