//! Record type stored in each [`Store`](super::Store).

use std::collections::BTreeMap;

use kvault_core::Value;
use serde::{Deserialize, Serialize};

/// One key's value plus its expiry and protection state.
///
/// `extras` holds caller-supplied side fields (the Rust-native replacement
/// for passing arbitrary keyword arguments through to storage) -- facades
/// such as the metrics facade stamp a `last_refresh` entry here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub value: Value,
    pub exp_time: i64,
    pub readonly: bool,
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(value: Value, exp_time: i64, readonly: bool, extras: BTreeMap<String, Value>) -> Self {
        Self { value, exp_time, readonly, extras }
    }

    /// A record is expired once `now` has passed its deadline. Expiry never
    /// mutates the record; callers decide whether to hide or delete it.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.exp_time
    }

    /// Encodes the record as a wire `Value::Map` with `value`/`exp_time`/
    /// `readonly`/`extras` fields, for RPC responses that hand back whole
    /// records (e.g. `get_all_keys`).
    pub fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert("value".to_string(), self.value.clone());
        m.insert("exp_time".to_string(), Value::Int(self.exp_time));
        m.insert("readonly".to_string(), Value::Bool(self.readonly));
        m.insert("extras".to_string(), Value::Map(self.extras.clone()));
        Value::Map(m)
    }
}
