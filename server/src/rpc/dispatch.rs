//! Explicit `(service, method)` dispatch table.
//!
//! The reference implementation looks a service up by URI in a dict and
//! then resolves the method via `getattr`, reflectively. The Rust port
//! replaces that with an explicit table built once at startup, populated
//! by each facade's `register_into` call.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use kvault_core::Value;
use thiserror::Error;

use crate::error::EngineError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type Handler = Arc<dyn Fn(Vec<Value>, BTreeMap<String, Value>) -> BoxFuture<'static, Result<Value, EngineError>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<(String, String), Handler>,
    known_services: std::collections::HashSet<String>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one `(service, method)` pair. `f` must be `Send + Sync` and
    /// return a boxed future -- this is the seam each facade's
    /// `register_into` uses.
    pub fn register<F, Fut>(&mut self, service: &str, method: &str, f: F)
    where
        F: Fn(Vec<Value>, BTreeMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        self.known_services.insert(service.to_string());
        self.handlers.insert((service.to_string(), method.to_string()), Arc::new(move |args, kwargs| Box::pin(f(args, kwargs))));
    }

    pub async fn call(&self, service: &str, method: &str, args: Vec<Value>, kwargs: BTreeMap<String, Value>) -> Result<Value, DispatchError> {
        if !self.known_services.contains(service) {
            return Err(DispatchError::UnknownService(service.to_string()));
        }
        let handler = self
            .handlers
            .get(&(service.to_string(), method.to_string()))
            .ok_or_else(|| DispatchError::UnknownMethod(method.to_string()))?;
        Ok(handler(args, kwargs).await?)
    }
}
