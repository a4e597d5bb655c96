//! kvault server -- a multi-store, TTL-aware key/value engine with readonly
//! protection, rotating on-disk backups, a named background-task
//! supervisor, and a length-framed binary RPC transport.
//!
//! - **Storage** ([`storage`]): `KvEngine`, `Store`, `Record`, `BackupRotator`
//! - **Supervisor** ([`supervisor`]): `TaskSupervisor`, the cleanup and
//!   metrics workers, `ServerConfig`
//! - **RPC** ([`rpc`]): `RpcServer`, the explicit dispatch table, connection
//!   handling, service-manifest hot reload, graceful shutdown
//! - **Facades** ([`facades`]): secrets, paths, pipelines, internal metrics

pub mod error;
pub mod facades;
pub mod rpc;
pub mod storage;
pub mod supervisor;

pub use error::EngineError;
