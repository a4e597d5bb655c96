//! Pipelines facade: workflow definitions with nested stages and an error
//! log, stored one record per pipeline in the `pipelines` store.
//!
//! Grounded on `original_source/hh/pipeline/{service,models}.py`'s
//! `Pipeline`/`Stage`/`PipelineManager`, redesigned per spec.md §3's
//! "facades hold no durable state of their own" requirement -- the original
//! keeps pipelines in a bare in-process `HashMap`; this keeps them as engine
//! records instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use kvault_core::Value;
use uuid::Uuid;

use crate::error::EngineError;
use crate::storage::{EditPatch, KvEngine};

pub const PIPELINES_STORE: &str = "pipelines";

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl Stage {
    fn pending(name: &str) -> Self {
        Self { id: Uuid::new_v4().to_string(), name: name.to_string(), status: "pending".to_string() }
    }

    fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert("id".to_string(), Value::String(self.id.clone()));
        m.insert("name".to_string(), Value::String(self.name.clone()));
        m.insert("status".to_string(), Value::String(self.status.clone()));
        Value::Map(m)
    }

    fn from_value(value: &Value) -> Option<Self> {
        let Value::Map(m) = value else { return None };
        Some(Self {
            id: m.get("id")?.as_str()?.to_string(),
            name: m.get("name")?.as_str()?.to_string(),
            status: m.get("status")?.as_str()?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub stages: Vec<Stage>,
    pub error_log: Vec<String>,
}

impl Pipeline {
    fn record_value(&self) -> Value {
        Value::String(self.name.clone())
    }

    fn extras(&self) -> BTreeMap<String, Value> {
        let mut extras = BTreeMap::new();
        extras.insert("id".to_string(), Value::String(self.id.clone()));
        extras.insert("stages".to_string(), Value::Array(self.stages.iter().map(Stage::to_value).collect()));
        extras.insert("error_log".to_string(), Value::Array(self.error_log.iter().cloned().map(Value::String).collect()));
        extras
    }

    fn from_record(id: &str, value: Value, extras: &BTreeMap<String, Value>) -> Option<Self> {
        let name = value.as_str()?.to_string();
        let stages = extras
            .get("stages")
            .and_then(|v| if let Value::Array(a) = v { Some(a) } else { None })
            .map(|a| a.iter().filter_map(Stage::from_value).collect())
            .unwrap_or_default();
        let error_log = extras
            .get("error_log")
            .and_then(|v| if let Value::Array(a) = v { Some(a) } else { None })
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Some(Self { id: id.to_string(), name, stages, error_log })
    }
}

pub struct PipelinesFacade {
    engine: Arc<KvEngine>,
}

impl PipelinesFacade {
    pub fn new(engine: Arc<KvEngine>) -> Self {
        engine.create_store(PIPELINES_STORE).expect("creating the pipelines store cannot fail");
        Self { engine }
    }

    pub fn create_pipeline(&self, name: &str) -> Result<String, EngineError> {
        let pipeline = Pipeline { id: Uuid::new_v4().to_string(), name: name.to_string(), stages: Vec::new(), error_log: Vec::new() };
        self.engine.add_key(PIPELINES_STORE, &pipeline.id, pipeline.record_value(), None, false, pipeline.extras())?;
        Ok(pipeline.id)
    }

    pub fn add_stage(&self, pipeline_id: &str, stage_name: &str) -> Result<String, EngineError> {
        let mut pipeline = self.load(pipeline_id)?.ok_or_else(|| EngineError::KeyMissing(pipeline_id.to_string()))?;
        let stage = Stage::pending(stage_name);
        let stage_id = stage.id.clone();
        pipeline.stages.push(stage);
        let patch = EditPatch { extras: pipeline.extras(), ..EditPatch::default() };
        self.engine.edit_key(PIPELINES_STORE, pipeline_id, patch, false)?;
        Ok(stage_id)
    }

    /// Appends a message to `pipeline_id`'s error log, for stage-failure
    /// reporting.
    pub fn record_error(&self, pipeline_id: &str, message: &str) -> Result<(), EngineError> {
        let mut pipeline = self.load(pipeline_id)?.ok_or_else(|| EngineError::KeyMissing(pipeline_id.to_string()))?;
        pipeline.error_log.push(message.to_string());
        let patch = EditPatch { extras: pipeline.extras(), ..EditPatch::default() };
        self.engine.edit_key(PIPELINES_STORE, pipeline_id, patch, false)
    }

    pub fn get_pipeline(&self, pipeline_id: &str) -> Result<Option<Pipeline>, EngineError> {
        self.load(pipeline_id)
    }

    pub fn list_pipelines(&self) -> Result<Vec<Pipeline>, EngineError> {
        let all = self.engine.get_all_keys(PIPELINES_STORE)?;
        Ok(all.into_iter().filter_map(|(id, record)| Pipeline::from_record(&id, record.value, &record.extras)).collect())
    }

    fn load(&self, pipeline_id: &str) -> Result<Option<Pipeline>, EngineError> {
        let Some(record) = self.engine.get_record(PIPELINES_STORE, pipeline_id)? else {
            return Ok(None);
        };
        Ok(Pipeline::from_record(pipeline_id, record.value, &record.extras))
    }
}
