//! Domain facades: thin adapters mapping named operations to engine calls.
//! Facades hold no durable state of their own -- every fact they expose
//! lives in an engine-owned store.

pub mod internal;
pub mod paths;
pub mod pipelines;
pub mod secrets;

pub use internal::InternalMetricsFacade;
pub use paths::PathsFacade;
pub use pipelines::PipelinesFacade;
pub use secrets::{FixedKeyResolver, KeyResolver, SecretsFacade};
