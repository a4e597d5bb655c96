//! Wire framing: a 4-byte big-endian length prefix followed by a MessagePack
//! payload, matching the original service's `recv(4)` / `recv(length)` /
//! `msgpack.unpackb(data, raw=False)` framing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;
use crate::value::Value;

/// Frames larger than this are rejected outright rather than allocating an
/// attacker-controlled buffer size.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// `(service_uri, method_name, positional_args, keyword_args)`, serialized
/// as a 4-element MessagePack array -- the same shape the original server's
/// dispatch loop unpacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub service: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

/// A response frame. `Err` carries a human-readable message only -- the
/// wire protocol has no structured error taxonomy, per the original's use
/// of plain exception strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    Ok(Value),
    Err(String),
}

/// Reads one length-prefixed MessagePack frame, decoding it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, CodecError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let bytes = read_raw_frame(reader).await?;
    Ok(rmp_serde::from_slice(&bytes)?)
}

/// Reads one length-prefixed frame and returns the raw payload bytes.
pub async fn read_raw_frame<R>(reader: &mut R) -> Result<Vec<u8>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Encodes `value` as MessagePack and writes it as one length-prefixed
/// frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = rmp_serde::to_vec(value)?;
    write_raw_frame(writer, &payload).await
}

/// Writes a pre-encoded payload as one length-prefixed frame.
pub async fn write_raw_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }
    let len = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_roundtrips_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let request = RpcRequest {
            service: "secrets".to_string(),
            method: "get_confidential_key".to_string(),
            args: vec![Value::String("db-password".to_string())],
            kwargs: BTreeMap::new(),
        };

        write_frame(&mut client, &request).await.expect("write");
        let decoded: RpcRequest = read_frame(&mut server).await.expect("read");

        assert_eq!(decoded.service, request.service);
        assert_eq!(decoded.method, request.method);
        assert_eq!(decoded.args.len(), 1);
    }

    #[tokio::test]
    async fn response_roundtrips() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        write_frame(&mut client, &RpcResponse::Ok(Value::Int(7))).await.expect("write");
        let decoded: RpcResponse = read_frame(&mut server).await.expect("read");
        match decoded {
            RpcResponse::Ok(Value::Int(7)) => {}
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_connection_reports_connection_closed() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let err = read_raw_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(16);
        let huge_len = (MAX_FRAME_BYTES as u32 + 1).to_be_bytes();
        client.write_all(&huge_len).await.expect("write len");
        let err = read_raw_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge(_)));
    }
}
