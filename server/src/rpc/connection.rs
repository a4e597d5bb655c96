//! A single accepted TCP connection: read one frame, dispatch, write one
//! frame, repeat. spec's RPC model is strict request/response per
//! connection -- there is no broadcast, no subscription, and no notion of
//! a cluster-peer connection, so this carries only what a request/response
//! loop needs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use kvault_core::codec::{read_frame, write_frame};
use kvault_core::error::CodecError;
use kvault_core::{RpcRequest, RpcResponse};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::dispatch::{DispatchError, DispatchTable};
use super::shutdown::ShutdownController;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Drives one connection's request/response loop until the peer disconnects
/// or a framing error occurs.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatch: &DispatchTable,
    shutdown: &ShutdownController,
) {
    let id = ConnectionId::next();
    let connected_at = Instant::now();
    debug!(connection = id.0, %peer_addr, "connection accepted");

    loop {
        let request: RpcRequest = match read_frame(&mut stream).await {
            Ok(req) => req,
            Err(CodecError::ConnectionClosed) => break,
            Err(e) => {
                warn!(connection = id.0, error = %e, "frame read failed, closing connection");
                break;
            }
        };

        let _guard = shutdown.in_flight_guard();
        let response = match dispatch.call(&request.service, &request.method, request.args, request.kwargs).await {
            Ok(value) => RpcResponse::Ok(value),
            // Unknown service/method: no response frame is sent, matching the
            // original's unhandled-exception-closes-the-socket behavior.
            Err(DispatchError::UnknownService(_) | DispatchError::UnknownMethod(_)) => {
                warn!(connection = id.0, service = %request.service, method = %request.method, "unknown service or method, closing connection");
                break;
            }
            Err(DispatchError::Engine(e)) => RpcResponse::Err(e.to_string()),
        };

        if let Err(e) = write_frame(&mut stream, &response).await {
            warn!(connection = id.0, error = %e, "frame write failed, closing connection");
            break;
        }
    }

    debug!(connection = id.0, elapsed = ?connected_at.elapsed(), "connection closed");
}
