//! Internal metrics facade: a thin adapter over the `metrics` store used by
//! the metrics worker and exposed read-only over RPC.

use std::collections::BTreeMap;
use std::sync::Arc;

use kvault_core::{Clock, Value};

use crate::error::EngineError;
use crate::storage::{EditPatch, KvEngine};

pub const METRICS_STORE: &str = "metrics";

pub struct InternalMetricsFacade {
    engine: Arc<KvEngine>,
    clock: Arc<dyn Clock>,
}

impl InternalMetricsFacade {
    pub fn new(engine: Arc<KvEngine>, clock: Arc<dyn Clock>) -> Self {
        engine.create_store(METRICS_STORE).expect("creating the metrics store cannot fail");
        Self { engine, clock }
    }

    fn stamped_extras(&self) -> BTreeMap<String, Value> {
        let mut extras = BTreeMap::new();
        extras.insert("last_refresh".to_string(), Value::Int(self.clock.now()));
        extras
    }

    pub fn add_internal_key(&self, key: &str, value: Value) -> Result<(), EngineError> {
        self.engine.add_key(METRICS_STORE, key, value, None, false, self.stamped_extras())
    }

    pub fn edit_internal_key(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let patch = EditPatch { value: Some(value), extras: self.stamped_extras(), ..EditPatch::default() };
        self.engine.edit_key(METRICS_STORE, key, patch, false)
    }

    pub fn delete_internal_key(&self, key: &str) -> Result<bool, EngineError> {
        self.engine.delete_key(METRICS_STORE, key)
    }

    pub fn get_internal_key(&self, key: &str) -> Result<Option<Value>, EngineError> {
        self.engine.get_key(METRICS_STORE, key)
    }

    pub fn get_all_internal_keys(&self) -> Result<BTreeMap<String, Value>, EngineError> {
        Ok(self.engine.get_all_keys(METRICS_STORE)?.into_iter().map(|(k, r)| (k, r.value)).collect())
    }
}
