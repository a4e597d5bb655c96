//! Small helpers pulling typed arguments out of a call's positional/keyword
//! `Value`s, used by the RPC service registrations in [`super::services`].
//! A parameter may be supplied positionally or by keyword -- positional
//! wins when both are present, matching Python's `*args, **kwargs` calling
//! convention the original server exposed.

use std::collections::BTreeMap;

use kvault_core::Value;

use crate::error::EngineError;

pub fn lookup(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str) -> Option<Value> {
    args.get(idx).cloned().or_else(|| kwargs.get(name).cloned())
}

pub fn require_str(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str) -> Result<String, EngineError> {
    lookup(args, kwargs, idx, name)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| EngineError::InvalidArgument(format!("missing or non-string argument `{name}`")))
}

pub fn optional_str(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str) -> Option<String> {
    match lookup(args, kwargs, idx, name) {
        Some(Value::Null) | None => None,
        Some(v) => v.as_str().map(str::to_string),
    }
}

pub fn optional_i64(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str) -> Option<i64> {
    match lookup(args, kwargs, idx, name) {
        Some(Value::Null) | None => None,
        Some(v) => v.as_int(),
    }
}

pub fn optional_bool(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str, default: bool) -> bool {
    match lookup(args, kwargs, idx, name) {
        Some(Value::Bool(b)) => b,
        _ => default,
    }
}

pub fn require_value(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize, name: &str) -> Result<Value, EngineError> {
    lookup(args, kwargs, idx, name).ok_or_else(|| EngineError::InvalidArgument(format!("missing argument `{name}`")))
}
