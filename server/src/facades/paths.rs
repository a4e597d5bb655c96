//! Paths facade: a nested `label -> env -> system -> path` routing
//! directory, stored as one record per label.

use std::collections::BTreeMap;
use std::sync::Arc;

use kvault_core::Value;

use crate::error::EngineError;
use crate::storage::{EditPatch, KvEngine};

pub const PATHS_STORE: &str = "paths";

pub struct PathsFacade {
    engine: Arc<KvEngine>,
}

impl PathsFacade {
    pub fn new(engine: Arc<KvEngine>) -> Self {
        engine.create_store(PATHS_STORE).expect("creating the paths store cannot fail");
        Self { engine }
    }

    /// Upserts `path` at `[env][system]` within `label`'s nested map,
    /// read-modify-write, matching `original_source/plugins/nas.py`'s
    /// `add_or_update_path`.
    pub fn add_or_update_path(&self, label: &str, env: &str, system: &str, path: &str) -> Result<(), EngineError> {
        let mut nested = self
            .engine
            .get_key(PATHS_STORE, label)?
            .and_then(|v| if let Value::Map(m) = v { Some(m) } else { None })
            .unwrap_or_default();

        let env_map = match nested.remove(env) {
            Some(Value::Map(m)) => m,
            _ => BTreeMap::new(),
        };
        let mut env_map = env_map;
        env_map.insert(system.to_string(), Value::String(path.to_string()));
        nested.insert(env.to_string(), Value::Map(env_map));

        let patch = EditPatch::value(Value::Map(nested));
        self.engine.edit_key(PATHS_STORE, label, patch, false)
    }

    /// Looks up `path` at `[env][system]` within `label`'s nested map.
    pub fn get_path(&self, label: &str, env: &str, system: &str) -> Result<Option<String>, EngineError> {
        let Some(Value::Map(nested)) = self.engine.get_key(PATHS_STORE, label)? else {
            return Ok(None);
        };
        let Some(Value::Map(env_map)) = nested.get(env) else {
            return Ok(None);
        };
        Ok(env_map.get(system).and_then(Value::as_str).map(str::to_string))
    }

    /// Every label's full nested map.
    pub fn get_all_paths(&self) -> Result<BTreeMap<String, Value>, EngineError> {
        Ok(self.engine.get_all_keys(PATHS_STORE)?.into_iter().map(|(k, r)| (k, r.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvault_core::ManualClock;

    use super::*;

    fn facade() -> PathsFacade {
        let clock = Arc::new(ManualClock::new(0));
        PathsFacade::new(Arc::new(KvEngine::new(clock)))
    }

    #[test]
    fn add_then_get_path_round_trips() {
        let facade = facade();
        facade.add_or_update_path("app1", "prod", "linux", "/srv/app1").unwrap();
        assert_eq!(facade.get_path("app1", "prod", "linux").unwrap(), Some("/srv/app1".to_string()));
    }

    #[test]
    fn unknown_label_env_or_system_returns_none() {
        let facade = facade();
        assert_eq!(facade.get_path("missing", "prod", "linux").unwrap(), None);
        facade.add_or_update_path("app1", "prod", "linux", "/srv/app1").unwrap();
        assert_eq!(facade.get_path("app1", "staging", "linux").unwrap(), None);
        assert_eq!(facade.get_path("app1", "prod", "windows").unwrap(), None);
    }

    #[test]
    fn second_update_preserves_earlier_envs_and_systems() {
        let facade = facade();
        facade.add_or_update_path("app1", "prod", "linux", "/srv/app1").unwrap();
        facade.add_or_update_path("app1", "prod", "windows", "C:\\app1").unwrap();
        facade.add_or_update_path("app1", "staging", "linux", "/staging/app1").unwrap();

        assert_eq!(facade.get_path("app1", "prod", "linux").unwrap(), Some("/srv/app1".to_string()));
        assert_eq!(facade.get_path("app1", "prod", "windows").unwrap(), Some("C:\\app1".to_string()));
        assert_eq!(facade.get_path("app1", "staging", "linux").unwrap(), Some("/staging/app1".to_string()));
    }

    #[test]
    fn get_all_paths_returns_every_label() {
        let facade = facade();
        facade.add_or_update_path("app1", "prod", "linux", "/srv/app1").unwrap();
        facade.add_or_update_path("app2", "prod", "linux", "/srv/app2").unwrap();
        assert_eq!(facade.get_all_paths().unwrap().len(), 2);
    }
}
