//! Background task supervision: a named-task registry with idempotent
//! start/stop, plus the built-in cleanup and metrics workers.

pub mod cleanup;
pub mod config;
pub mod metrics;
pub mod registry;

pub use config::ServerConfig;
pub use registry::{StartFn, TaskSupervisor};
