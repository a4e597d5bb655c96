//! Accept loop: binds the listening socket, races `accept()` against a
//! timeout so the loop can observe shutdown, and hands each connection to a
//! semaphore-gated worker pool.
//!
//! Grounded on `original_source/hh/core/server.py`'s `start_server`
//! (`SO_REUSEADDR`, `listen(5)`, `settimeout(5)`, `ThreadPoolExecutor`) and
//! the teacher's `network/module.rs` deferred `new()`/`start()`/`serve()`
//! three-phase lifecycle.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::config::RpcConfig;
use super::connection::handle_connection;
use super::dispatch::DispatchTable;
use super::shutdown::ShutdownController;

pub struct RpcServer {
    config: RpcConfig,
    dispatch: Arc<DispatchTable>,
    shutdown: Arc<ShutdownController>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, dispatch: Arc<DispatchTable>, shutdown: Arc<ShutdownController>) -> Self {
        Self { config, dispatch, shutdown }
    }

    /// Binds the listening socket and returns the server ready to `serve()`.
    /// Split from `serve` so the bound address (useful when the configured
    /// port is `0`, for tests) is observable before the accept loop starts.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "rpc server listening");
        Ok(listener)
    }

    /// Runs the accept loop until the shutdown signal fires. Each accepted
    /// connection acquires a worker-pool permit before it is dispatched;
    /// when the pool is saturated, `accept()` keeps draining the kernel
    /// backlog but the handler itself waits for a free permit.
    pub async fn serve(&self, listener: TcpListener) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut shutdown_rx = self.shutdown.shutdown_receiver();

        loop {
            let accept_result = tokio::select! {
                () = Self::wait_for_shutdown(&mut shutdown_rx) => break,
                result = tokio::time::timeout(self.config.accept_timeout, listener.accept()) => result,
            };

            let (stream, peer_addr) = match accept_result {
                Ok(Ok(pair)) => pair,
                // Accept-loop timeout: the normal path to re-check shutdown.
                Err(_) => continue,
                // Transient socket error: ignored, matching the original's
                // `except socket.error: continue`.
                Ok(Err(e)) => {
                    warn!(error = %e, "transient accept error, continuing");
                    continue;
                }
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let dispatch = Arc::clone(&self.dispatch);
            let shutdown = Arc::clone(&self.shutdown);
            tokio::spawn(async move {
                let _permit = permit;
                handle_connection(stream, peer_addr, &dispatch, &shutdown).await;
            });
        }

        info!("accept loop exiting");
    }

    async fn wait_for_shutdown(rx: &mut tokio::sync::watch::Receiver<bool>) {
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kvault_core::{RpcRequest, RpcResponse};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    fn test_config() -> RpcConfig {
        RpcConfig { bind_addr: "127.0.0.1:0".to_string(), worker_pool_size: 4, accept_timeout: Duration::from_millis(200) }
    }

    #[tokio::test]
    async fn round_trips_one_request_over_tcp() {
        let mut dispatch = DispatchTable::new();
        dispatch.register("echo", "ping", |args, _kwargs| async move {
            Ok(args.into_iter().next().unwrap_or(kvault_core::Value::Null))
        });
        let dispatch = Arc::new(dispatch);
        let shutdown = Arc::new(ShutdownController::new());

        let server = RpcServer::new(test_config(), dispatch, Arc::clone(&shutdown));
        let listener = server.bind().await.expect("bind");
        let addr = listener.local_addr().unwrap();

        let serve_handle = tokio::spawn(async move { server.serve(listener).await });

        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let request = RpcRequest { service: "echo".to_string(), method: "ping".to_string(), args: vec![kvault_core::Value::Int(42)], kwargs: Default::default() };
        kvault_core::codec::write_frame(&mut stream, &request).await.unwrap();

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        let response: RpcResponse = rmp_serde::from_slice(&payload).unwrap();

        match response {
            RpcResponse::Ok(kvault_core::Value::Int(42)) => {}
            other => panic!("unexpected response: {other:?}"),
        }

        drop(stream);
        shutdown.trigger_shutdown();
        serve_handle.await.unwrap();
    }

    #[tokio::test]
    async fn accept_loop_exits_promptly_on_shutdown_with_no_connections() {
        let dispatch = Arc::new(DispatchTable::new());
        let shutdown = Arc::new(ShutdownController::new());
        let server = RpcServer::new(test_config(), dispatch, Arc::clone(&shutdown));
        let listener = server.bind().await.expect("bind");

        let serve_handle = tokio::spawn(async move { server.serve(listener).await });
        shutdown.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), serve_handle).await.expect("accept loop did not exit promptly").unwrap();
    }
}
