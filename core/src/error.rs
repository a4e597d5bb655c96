//! Error types for the wire codec and the crypto primitives.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame exceeds maximum size ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("connection closed while reading frame")]
    ConnectionClosed,
    #[error("msgpack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key: expected 32 bytes after base64 decode, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
    #[error("token too short to contain a valid frame")]
    TokenTooShort,
    #[error("unsupported token version byte {0:#x}")]
    UnsupportedVersion(u8),
    #[error("HMAC authentication failed")]
    InvalidSignature,
    #[error("ciphertext padding invalid")]
    InvalidPadding,
}
