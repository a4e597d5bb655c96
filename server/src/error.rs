//! The error taxonomy shared by the storage engine, the facades and the RPC
//! dispatch layer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store not found: {0}")]
    StoreMissing(String),
    #[error("key not found: {0}")]
    KeyMissing(String),
    #[error("key is readonly: {0}")]
    ReadOnly(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("failed to decode value: {0}")]
    DecodeError(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::IoError(e.to_string())
    }
}
