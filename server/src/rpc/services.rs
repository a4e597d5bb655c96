//! Builds the explicit `(service, method)` dispatch table from the engine
//! and the domain facades. This is the Rust-native replacement for the
//! original's reflective `services[uri]` / `getattr(service, method)`
//! lookup (REDESIGN FLAGS §9) -- every exposed operation is registered
//! once, at startup, rather than resolved per call.

use std::collections::BTreeMap;
use std::sync::Arc;

use kvault_core::Value;

use crate::error::EngineError;
use crate::facades::{InternalMetricsFacade, PathsFacade, PipelinesFacade, SecretsFacade};
use crate::storage::{EditPatch, KvEngine};

use super::args::{lookup, optional_bool, optional_i64, require_str, require_value};
use super::dispatch::DispatchTable;

pub const KV_SERVICE: &str = "key_value_store";
pub const SECRETS_SERVICE: &str = "secrets";
pub const PATHS_SERVICE: &str = "paths";
pub const PIPELINES_SERVICE: &str = "pipelines";
pub const INTERNAL_SERVICE: &str = "internal";

/// Registers every facade's operations into a fresh [`DispatchTable`].
pub fn build_dispatch_table(
    engine: Arc<KvEngine>,
    secrets: Arc<SecretsFacade>,
    paths: Arc<PathsFacade>,
    pipelines: Arc<PipelinesFacade>,
    internal: Arc<InternalMetricsFacade>,
) -> DispatchTable {
    let mut table = DispatchTable::new();
    register_kv_service(&mut table, Arc::clone(&engine));
    register_secrets_service(&mut table, secrets);
    register_paths_service(&mut table, paths);
    register_pipelines_service(&mut table, pipelines);
    register_internal_service(&mut table, internal);
    table
}

fn extras_arg(args: &[Value], kwargs: &BTreeMap<String, Value>, idx: usize) -> BTreeMap<String, Value> {
    match lookup(args, kwargs, idx, "extras") {
        Some(Value::Map(m)) => m,
        _ => BTreeMap::new(),
    }
}

fn register_kv_service(table: &mut DispatchTable, engine: Arc<KvEngine>) {
    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "create_store", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let name = require_str(&args, &kwargs, 0, "store_name")?;
            Ok(Value::Bool(e.create_store(&name)?))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "delete_store", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let name = require_str(&args, &kwargs, 0, "store_name")?;
            Ok(Value::Bool(e.delete_store(&name)))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "list_stores", move |_args, _kwargs| {
        let e = Arc::clone(&e);
        async move { Ok(Value::Array(e.list_stores().into_iter().map(Value::String).collect())) }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "add_key", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let store = require_str(&args, &kwargs, 0, "store_name")?;
            let key = require_str(&args, &kwargs, 1, "key")?;
            let value = require_value(&args, &kwargs, 2, "value")?;
            let ttl = optional_i64(&args, &kwargs, 3, "ttl");
            let readonly = optional_bool(&args, &kwargs, 4, "readonly", false);
            let extras = extras_arg(&args, &kwargs, 5);
            e.add_key(&store, &key, value, ttl, readonly, extras)?;
            Ok(Value::Bool(true))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "edit_key", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let store = require_str(&args, &kwargs, 0, "store_name")?;
            let key = require_str(&args, &kwargs, 1, "key")?;
            let value = match lookup(&args, &kwargs, 2, "value") {
                Some(Value::Null) | None => None,
                Some(v) => Some(v),
            };
            let ttl = optional_i64(&args, &kwargs, 3, "ttl");
            let force = optional_bool(&args, &kwargs, 4, "force", false);
            let readonly = match lookup(&args, &kwargs, 5, "readonly") {
                Some(Value::Bool(b)) => Some(b),
                _ => None,
            };
            let extras = extras_arg(&args, &kwargs, 6);
            let patch = EditPatch { value, ttl_secs: ttl, readonly, extras };
            e.edit_key(&store, &key, patch, force)?;
            Ok(Value::Bool(true))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "delete_key", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let store = require_str(&args, &kwargs, 0, "store_name")?;
            let key = require_str(&args, &kwargs, 1, "key")?;
            Ok(Value::Bool(e.delete_key(&store, &key)?))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "get_key", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let store = require_str(&args, &kwargs, 0, "store_name")?;
            let key = require_str(&args, &kwargs, 1, "key")?;
            Ok(e.get_key(&store, &key)?.unwrap_or(Value::Null))
        }
    });

    let e = Arc::clone(&engine);
    table.register(KV_SERVICE, "get_all_keys", move |args, kwargs| {
        let e = Arc::clone(&e);
        async move {
            let store = require_str(&args, &kwargs, 0, "store_name")?;
            let all = e.get_all_keys(&store)?;
            Ok(Value::Map(all.into_iter().map(|(k, r)| (k, r.to_value())).collect()))
        }
    });

    table.register(KV_SERVICE, "update_configuration", move |_args, kwargs| {
        let e = Arc::clone(&engine);
        async move {
            let mut config = e.config();
            if let Some(Value::Int(ttl)) = kwargs.get("default_ttl_secs") {
                config.default_ttl_secs = *ttl;
            }
            e.update_configuration(config);
            Ok(Value::Bool(true))
        }
    });
}

fn register_secrets_service(table: &mut DispatchTable, secrets: Arc<SecretsFacade>) {
    let s = Arc::clone(&secrets);
    table.register(SECRETS_SERVICE, "add_confidential_key", move |args, kwargs| {
        let s = Arc::clone(&s);
        async move {
            let key = require_str(&args, &kwargs, 0, "key")?;
            let value = require_str(&args, &kwargs, 1, "value")?;
            let ttl = optional_i64(&args, &kwargs, 2, "ttl");
            let readonly = optional_bool(&args, &kwargs, 3, "readonly", false);
            s.add_confidential_key(&key, &value, ttl, readonly)?;
            Ok(Value::Bool(true))
        }
    });

    table.register(SECRETS_SERVICE, "get_confidential_key", move |args, kwargs| {
        let s = Arc::clone(&secrets);
        async move {
            let key = require_str(&args, &kwargs, 0, "key")?;
            Ok(s.get_confidential_key(&key)?.map(Value::String).unwrap_or(Value::Null))
        }
    });
}

fn register_paths_service(table: &mut DispatchTable, paths: Arc<PathsFacade>) {
    let p = Arc::clone(&paths);
    table.register(PATHS_SERVICE, "add_or_update_path", move |args, kwargs| {
        let p = Arc::clone(&p);
        async move {
            let label = require_str(&args, &kwargs, 0, "label")?;
            let env = require_str(&args, &kwargs, 1, "env")?;
            let system = require_str(&args, &kwargs, 2, "system")?;
            let path = require_str(&args, &kwargs, 3, "path")?;
            p.add_or_update_path(&label, &env, &system, &path)?;
            Ok(Value::Bool(true))
        }
    });

    let p = Arc::clone(&paths);
    table.register(PATHS_SERVICE, "get_path", move |args, kwargs| {
        let p = Arc::clone(&p);
        async move {
            let label = require_str(&args, &kwargs, 0, "label")?;
            let env = require_str(&args, &kwargs, 1, "env")?;
            let system = require_str(&args, &kwargs, 2, "system")?;
            Ok(p.get_path(&label, &env, &system)?.map(Value::String).unwrap_or(Value::Null))
        }
    });

    table.register(PATHS_SERVICE, "get_all_paths", move |_args, _kwargs| {
        let p = Arc::clone(&paths);
        async move { Ok(Value::Map(p.get_all_paths()?)) }
    });
}

fn register_pipelines_service(table: &mut DispatchTable, pipelines: Arc<PipelinesFacade>) {
    let p = Arc::clone(&pipelines);
    table.register(PIPELINES_SERVICE, "create_pipeline", move |args, kwargs| {
        let p = Arc::clone(&p);
        async move {
            let name = require_str(&args, &kwargs, 0, "name")?;
            Ok(Value::String(p.create_pipeline(&name)?))
        }
    });

    let p = Arc::clone(&pipelines);
    table.register(PIPELINES_SERVICE, "add_stage", move |args, kwargs| {
        let p = Arc::clone(&p);
        async move {
            let pipeline_id = require_str(&args, &kwargs, 0, "pipeline_id")?;
            let stage_name = require_str(&args, &kwargs, 1, "stage_name")?;
            Ok(Value::String(p.add_stage(&pipeline_id, &stage_name)?))
        }
    });

    let p = Arc::clone(&pipelines);
    table.register(PIPELINES_SERVICE, "get_pipeline", move |args, kwargs| {
        let p = Arc::clone(&p);
        async move {
            let pipeline_id = require_str(&args, &kwargs, 0, "pipeline_id")?;
            Ok(p.get_pipeline(&pipeline_id)?.map(pipeline_to_value).unwrap_or(Value::Null))
        }
    });

    table.register(PIPELINES_SERVICE, "list_pipelines", move |_args, _kwargs| {
        let p = Arc::clone(&pipelines);
        async move { Ok(Value::Array(p.list_pipelines()?.into_iter().map(pipeline_to_value).collect())) }
    });
}

fn pipeline_to_value(pipeline: crate::facades::pipelines::Pipeline) -> Value {
    let mut m = BTreeMap::new();
    m.insert("id".to_string(), Value::String(pipeline.id));
    m.insert("name".to_string(), Value::String(pipeline.name));
    m.insert(
        "stages".to_string(),
        Value::Array(
            pipeline
                .stages
                .into_iter()
                .map(|s| {
                    let mut sm = BTreeMap::new();
                    sm.insert("id".to_string(), Value::String(s.id));
                    sm.insert("name".to_string(), Value::String(s.name));
                    sm.insert("status".to_string(), Value::String(s.status));
                    Value::Map(sm)
                })
                .collect(),
        ),
    );
    m.insert("error_log".to_string(), Value::Array(pipeline.error_log.into_iter().map(Value::String).collect()));
    Value::Map(m)
}

fn register_internal_service(table: &mut DispatchTable, internal: Arc<InternalMetricsFacade>) {
    let i = Arc::clone(&internal);
    table.register(INTERNAL_SERVICE, "get_internal_key", move |args, kwargs| {
        let i = Arc::clone(&i);
        async move {
            let key = require_str(&args, &kwargs, 0, "key")?;
            Ok(i.get_internal_key(&key)?.unwrap_or(Value::Null))
        }
    });

    table.register(INTERNAL_SERVICE, "get_all_internal_keys", move |_args, _kwargs| {
        let i = Arc::clone(&internal);
        async move { Ok(Value::Map(i.get_all_internal_keys()?)) }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvault_core::ManualClock;

    use super::*;
    use crate::facades::secrets::FixedKeyResolver;

    fn table() -> DispatchTable {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let engine = Arc::new(KvEngine::new(clock.clone()));
        let key = kvault_core::FernetKey::from_base64("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();
        let secrets = Arc::new(SecretsFacade::new(Arc::clone(&engine), clock.clone(), Arc::new(FixedKeyResolver::new(key))));
        let paths = Arc::new(PathsFacade::new(Arc::clone(&engine)));
        let pipelines = Arc::new(PipelinesFacade::new(Arc::clone(&engine)));
        let internal = Arc::new(InternalMetricsFacade::new(Arc::clone(&engine), clock));
        build_dispatch_table(engine, secrets, paths, pipelines, internal)
    }

    #[tokio::test]
    async fn create_store_then_add_and_get_key() {
        let table = table();
        let created = table.call(KV_SERVICE, "create_store", vec![Value::String("s".to_string())], BTreeMap::new()).await.unwrap();
        assert_eq!(created, Value::Bool(true));

        table
            .call(
                KV_SERVICE,
                "add_key",
                vec![Value::String("s".to_string()), Value::String("k".to_string()), Value::String("v".to_string())],
                BTreeMap::new(),
            )
            .await
            .unwrap();

        let got = table
            .call(KV_SERVICE, "get_key", vec![Value::String("s".to_string()), Value::String("k".to_string())], BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(got, Value::String("v".to_string()));
    }

    #[tokio::test]
    async fn secrets_round_trip_over_dispatch() {
        let table = table();
        table
            .call(
                SECRETS_SERVICE,
                "add_confidential_key",
                vec![Value::String("pw".to_string()), Value::String("hunter2".to_string())],
                BTreeMap::new(),
            )
            .await
            .unwrap();

        let got = table.call(SECRETS_SERVICE, "get_confidential_key", vec![Value::String("pw".to_string())], BTreeMap::new()).await.unwrap();
        assert_eq!(got, Value::String("hunter2".to_string()));
    }

    #[tokio::test]
    async fn pipelines_create_add_stage_and_get() {
        let table = table();
        let id = table.call(PIPELINES_SERVICE, "create_pipeline", vec![Value::String("deploy".to_string())], BTreeMap::new()).await.unwrap();
        let Value::String(id) = id else { panic!("expected string id") };

        table.call(PIPELINES_SERVICE, "add_stage", vec![Value::String(id.clone()), Value::String("build".to_string())], BTreeMap::new()).await.unwrap();

        let pipeline = table.call(PIPELINES_SERVICE, "get_pipeline", vec![Value::String(id)], BTreeMap::new()).await.unwrap();
        let Value::Map(m) = pipeline else { panic!("expected map") };
        let Some(Value::Array(stages)) = m.get("stages") else { panic!("expected stages array") };
        assert_eq!(stages.len(), 1);
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let table = table();
        let err = table.call("nope", "m", vec![], BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, crate::rpc::dispatch::DispatchError::UnknownService(_)));
    }
}
