//! The multi-store key/value engine: store lifecycle plus key operations
//! with TTL expiry and readonly protection.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use kvault_core::{Clock, Value, DEFAULT_TTL_SECS};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::EngineError;

use super::record::Record;
use super::store::Store;

/// A field-wise patch applied by [`KvEngine::edit_key`]. Every field is
/// optional: `None`/empty means "leave as-is". `extras` is merged key-by-key
/// rather than replacing the record's whole extras map, matching the
/// original's `store[key].update(kwargs)` semantics.
#[derive(Debug, Clone, Default)]
pub struct EditPatch {
    pub value: Option<Value>,
    pub ttl_secs: Option<i64>,
    pub readonly: Option<bool>,
    pub extras: BTreeMap<String, Value>,
}

impl EditPatch {
    pub fn value(value: Value) -> Self {
        Self { value: Some(value), ..Self::default() }
    }
}

/// Runtime-tunable engine configuration, patched via
/// [`KvEngine::update_configuration`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default TTL (seconds) applied when a caller does not supply one.
    pub default_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_ttl_secs: DEFAULT_TTL_SECS }
    }
}

/// Owns every store and the clock used to compute expiry deadlines.
pub struct KvEngine {
    stores: DashMap<String, Arc<Store>>,
    clock: Arc<dyn Clock>,
    config: RwLock<EngineConfig>,
}

impl KvEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { stores: DashMap::new(), clock, config: RwLock::new(EngineConfig::default()) }
    }

    pub fn update_configuration(&self, config: EngineConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Creates a store, returning whether it was newly created. Idempotent:
    /// creating an already-existing store logs and returns `Ok(false)`
    /// rather than erroring.
    pub fn create_store(&self, name: &str) -> Result<bool, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidArgument("store name must be a non-empty string".to_string()));
        }
        if self.stores.contains_key(name) {
            info!(store = name, "store already exists");
            return Ok(false);
        }
        self.stores.insert(name.to_string(), Arc::new(Store::new()));
        info!(store = name, "store created");
        Ok(true)
    }

    /// Deletes a store, returning whether it existed.
    pub fn delete_store(&self, name: &str) -> bool {
        let existed = self.stores.remove(name).is_some();
        if existed {
            info!(store = name, "store deleted");
        }
        existed
    }

    pub fn list_stores(&self) -> Vec<String> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    fn get_store(&self, name: &str) -> Result<Arc<Store>, EngineError> {
        self.stores.get(name).map(|e| Arc::clone(e.value())).ok_or_else(|| EngineError::StoreMissing(name.to_string()))
    }

    /// Returns every `Arc<Store>` keyed by name, for the cleanup worker's
    /// sweep.
    pub fn all_stores(&self) -> Vec<(String, Arc<Store>)> {
        self.stores.iter().map(|e| (e.key().clone(), Arc::clone(e.value()))).collect()
    }

    /// Creates `name` if needed and inserts `records` directly, bypassing
    /// readonly checks and TTL recomputation. Used at startup to rehydrate a
    /// store from its most recent backup (spec.md §4.2's `load_from_backup`
    /// hook).
    pub fn restore_store(&self, name: &str, records: Vec<(String, Record)>) -> Result<(), EngineError> {
        self.create_store(name)?;
        let store = self.get_store(name)?;
        for (key, record) in records {
            store.put(key, record);
        }
        Ok(())
    }

    /// Adds a new key. Refuses to overwrite a readonly key; overwriting a
    /// writable key is allowed (matches the original's "upsert unless
    /// readonly" semantics for `_add_key`).
    ///
    /// The readonly check and the write happen inside a single
    /// [`Store::update_atomic`] call so two concurrent `add_key`s on the
    /// same key cannot both pass the check before either writes (spec.md §3
    /// invariant 5 / testable property 5, linearizability).
    pub fn add_key(
        &self,
        store_name: &str,
        key: &str,
        value: Value,
        ttl_secs: Option<i64>,
        readonly: bool,
        extras: BTreeMap<String, Value>,
    ) -> Result<(), EngineError> {
        let store = self.get_store(store_name)?;
        let ttl = ttl_secs.unwrap_or_else(|| self.config().default_ttl_secs);
        let exp_time = self.clock.now() + ttl;
        store.update_atomic(key, |existing| {
            if let Some(existing) = existing {
                if existing.readonly {
                    warn!(store = store_name, key, "refusing to overwrite readonly key");
                    return Err(EngineError::ReadOnly(key.to_string()));
                }
            }
            Ok((Record::new(value, exp_time, readonly, extras), ()))
        })
    }

    /// Edits an existing key, merging `patch` field-wise into the record. A
    /// missing key is upserted rather than rejected (see `DESIGN.md`'s Open
    /// Question #1 decision). On an existing readonly key, the edit is
    /// refused unless `force` is set. If `patch.ttl_secs` is present,
    /// `exp_time` is recomputed as `now + ttl`; the ttl itself is never
    /// stored. `patch.extras` is merged key-by-key rather than replacing the
    /// whole extras map. Read-modify-write happens under one
    /// [`Store::update_atomic`] call for the same race-freedom reason as
    /// `add_key`.
    pub fn edit_key(&self, store_name: &str, key: &str, patch: EditPatch, force: bool) -> Result<(), EngineError> {
        let store = self.get_store(store_name)?;
        let now = self.clock.now();
        store.update_atomic(key, |existing| match existing {
            Some(existing) => {
                if existing.readonly && !force {
                    return Err(EngineError::ReadOnly(key.to_string()));
                }
                let mut updated = existing.clone();
                if let Some(value) = patch.value {
                    updated.value = value;
                }
                if let Some(ttl) = patch.ttl_secs {
                    updated.exp_time = now + ttl;
                }
                if let Some(readonly) = patch.readonly {
                    updated.readonly = readonly;
                }
                updated.extras.extend(patch.extras);
                Ok((updated, ()))
            }
            None => {
                let ttl = patch.ttl_secs.unwrap_or_else(|| self.config().default_ttl_secs);
                let exp_time = now + ttl;
                let readonly = patch.readonly.unwrap_or(false);
                let value = patch.value.unwrap_or(Value::Null);
                Ok((Record::new(value, exp_time, readonly, patch.extras), ()))
            }
        })
    }

    /// Deletes a key, refusing if it is readonly.
    pub fn delete_key(&self, store_name: &str, key: &str) -> Result<bool, EngineError> {
        let store = self.get_store(store_name)?;
        store.remove_atomic(key, |existing| match existing {
            Some(existing) => {
                if existing.readonly {
                    Err(EngineError::ReadOnly(key.to_string()))
                } else {
                    Ok((true, true))
                }
            }
            None => Ok((false, false)),
        })
    }

    /// Returns a key's value if present and not expired. An expired key is
    /// hidden from reads but not physically removed -- only the cleanup
    /// worker deletes expired entries.
    pub fn get_key(&self, store_name: &str, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.get_record(store_name, key)?.map(|r| r.value))
    }

    /// Like [`KvEngine::get_key`] but returns the full record, including
    /// `extras`.
    pub fn get_record(&self, store_name: &str, key: &str) -> Result<Option<Record>, EngineError> {
        let store = self.get_store(store_name)?;
        let now = self.clock.now();
        Ok(store.get(key).filter(|r| !r.is_expired(now)))
    }

    /// Returns every non-expired record in a store, keyed by key -- the
    /// full record (`value`/`exp_time`/`readonly`/`extras`), per spec.md
    /// §4.1's `get_all_keys(store) -> {key: record}` contract.
    pub fn get_all_keys(&self, store_name: &str) -> Result<BTreeMap<String, Record>, EngineError> {
        let store = self.get_store(store_name)?;
        let now = self.clock.now();
        Ok(store.snapshot().into_iter().filter(|(_, r)| !r.is_expired(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvault_core::ManualClock;

    use super::*;

    fn engine(now: i64) -> (KvEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (KvEngine::new(clock.clone()), clock)
    }

    #[test]
    fn create_store_is_idempotent() {
        let (engine, _clock) = engine(0);
        assert!(engine.create_store("s").unwrap());
        assert!(!engine.create_store("s").unwrap(), "second create reports already-exists");
        assert_eq!(engine.list_stores(), vec!["s".to_string()]);
    }

    #[test]
    fn create_store_rejects_empty_name() {
        let (engine, _clock) = engine(0);
        let err = engine.create_store("").unwrap_err();
        assert_eq!(err, EngineError::InvalidArgument("store name must be a non-empty string".to_string()));
    }

    #[test]
    fn delete_store_reports_existence() {
        let (engine, _clock) = engine(0);
        assert!(!engine.delete_store("missing"));
        engine.create_store("s").unwrap();
        assert!(engine.delete_store("s"));
        assert!(!engine.delete_store("s"));
    }

    #[test]
    fn add_key_defaults_ttl_to_ten_years() {
        let (engine, _clock) = engine(1_000);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), None, false, BTreeMap::new()).unwrap();
        let record = engine.get_record("s", "k").unwrap().unwrap();
        assert_eq!(record.exp_time, 1_000 + kvault_core::DEFAULT_TTL_SECS);
    }

    #[test]
    fn add_key_refuses_to_overwrite_readonly() {
        let (engine, _clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), None, true, BTreeMap::new()).unwrap();
        let err = engine.add_key("s", "k", Value::Int(2), None, false, BTreeMap::new()).unwrap_err();
        assert_eq!(err, EngineError::ReadOnly("k".to_string()));
    }

    #[test]
    fn edit_key_upserts_when_missing() {
        let (engine, _clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.edit_key("s", "new-key", EditPatch::value(Value::Int(9)), false).unwrap();
        assert_eq!(engine.get_key("s", "new-key").unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn edit_key_refuses_readonly_without_force() {
        let (engine, _clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), None, true, BTreeMap::new()).unwrap();
        let err = engine.edit_key("s", "k", EditPatch::value(Value::Int(2)), false).unwrap_err();
        assert_eq!(err, EngineError::ReadOnly("k".to_string()));
    }

    #[test]
    fn edit_key_with_force_overwrites_readonly() {
        let (engine, _clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), None, true, BTreeMap::new()).unwrap();
        engine.edit_key("s", "k", EditPatch::value(Value::Int(2)), true).unwrap();
        assert_eq!(engine.get_key("s", "k").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn edit_key_recomputes_exp_time_from_ttl_patch() {
        let (engine, _clock) = engine(1_000);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), Some(10), false, BTreeMap::new()).unwrap();
        let patch = EditPatch { ttl_secs: Some(500), ..EditPatch::default() };
        engine.edit_key("s", "k", patch, false).unwrap();
        let record = engine.get_record("s", "k").unwrap().unwrap();
        assert_eq!(record.exp_time, 1_000 + 500);
    }

    #[test]
    fn edit_key_merges_extras_rather_than_replacing() {
        let (engine, _clock) = engine(0);
        engine.create_store("s").unwrap();
        let mut initial_extras = BTreeMap::new();
        initial_extras.insert("creator".to_string(), Value::String("alice".to_string()));
        engine.add_key("s", "k", Value::Int(1), None, false, initial_extras).unwrap();

        let mut patch_extras = BTreeMap::new();
        patch_extras.insert("last_refresh".to_string(), Value::Int(42));
        engine.edit_key("s", "k", EditPatch { extras: patch_extras, ..EditPatch::default() }, false).unwrap();

        let record = engine.get_record("s", "k").unwrap().unwrap();
        assert_eq!(record.extras.get("creator"), Some(&Value::String("alice".to_string())));
        assert_eq!(record.extras.get("last_refresh"), Some(&Value::Int(42)));
    }

    #[test]
    fn get_key_hides_expired_without_deleting() {
        let (engine, clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.add_key("s", "k", Value::Int(1), Some(10), false, BTreeMap::new()).unwrap();
        clock.advance(11);
        assert_eq!(engine.get_key("s", "k").unwrap(), None);
        // still physically present: a subsequent read at an earlier clock sees it
        clock.set(5);
        assert_eq!(engine.get_key("s", "k").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn missing_store_is_an_error() {
        let (engine, _clock) = engine(0);
        let err = engine.get_key("nope", "k").unwrap_err();
        assert_eq!(err, EngineError::StoreMissing("nope".to_string()));
    }

    #[test]
    fn restore_store_rehydrates_records_verbatim() {
        let (engine, _clock) = engine(0);
        let records = vec![("k".to_string(), Record::new(Value::Int(7), i64::MAX, false, BTreeMap::new()))];
        engine.restore_store("s", records).unwrap();
        assert_eq!(engine.get_key("s", "k").unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn get_all_keys_excludes_expired() {
        let (engine, clock) = engine(0);
        engine.create_store("s").unwrap();
        engine.add_key("s", "live", Value::Int(1), Some(100), false, BTreeMap::new()).unwrap();
        engine.add_key("s", "dead", Value::Int(2), Some(1), false, BTreeMap::new()).unwrap();
        clock.advance(5);
        let all = engine.get_all_keys("s").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("live").unwrap().value, Value::Int(1));
    }
}
