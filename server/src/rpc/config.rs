//! RPC transport configuration: bind address, bounded worker-pool size, and
//! the accept-loop timeout. TLS/CORS/websocket-buffer fields from the
//! original network config are dropped -- transport encryption is out of
//! scope and this transport is raw TCP, not HTTP/websocket.

use std::time::Duration;

use crate::supervisor::ServerConfig;

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub bind_addr: String,
    pub worker_pool_size: usize,
    pub accept_timeout: Duration,
}

impl From<&ServerConfig> for RpcConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr.clone(),
            worker_pool_size: config.worker_pool_size,
            accept_timeout: config.accept_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_from_server_config() {
        let server_config = ServerConfig::default();
        let rpc_config = RpcConfig::from(&server_config);
        assert_eq!(rpc_config.bind_addr, "127.0.0.1:6666");
        assert_eq!(rpc_config.worker_pool_size, 10);
        assert_eq!(rpc_config.accept_timeout, Duration::from_secs(5));
    }
}
