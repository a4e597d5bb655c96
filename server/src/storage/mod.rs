//! Storage layer: the multi-store key/value engine, its backing per-store
//! maps, the record type, and rotating on-disk backups.

pub mod backup;
pub mod engine;
pub mod record;
pub mod store;

pub use backup::BackupRotator;
pub use engine::{EditPatch, EngineConfig, KvEngine};
pub use record::Record;
pub use store::Store;
