//! Server-wide configuration: storage defaults, background task intervals,
//! and the RPC/manifest surface. Loading this from a config file is out of
//! scope -- callers build it programmatically (`main`, or tests).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default TTL (seconds) applied to keys created without one.
    pub status_ttl: i64,
    /// Interval between cleanup-worker sweeps.
    pub cleanup_frequency: Duration,
    /// Interval between metrics-worker samples.
    pub metrics_interval: Duration,
    /// Directory rotating JSON backups are written to.
    pub backup_dir: PathBuf,
    /// Number of rotated backup generations retained per store.
    pub max_backups: u32,
    /// Address the RPC server listens on.
    pub bind_addr: String,
    /// Bounded worker-pool size for the RPC accept loop.
    pub worker_pool_size: usize,
    /// Timeout the accept loop waits on each `accept()` call before
    /// re-checking the shutdown signal.
    pub accept_timeout: Duration,
    /// Path to the YAML service manifest, if hot-reload is enabled.
    pub manifest_path: Option<PathBuf>,
    /// Interval between manifest mtime checks.
    pub refresh_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            status_ttl: kvault_core::DEFAULT_TTL_SECS,
            cleanup_frequency: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(60),
            backup_dir: PathBuf::from("./backups"),
            max_backups: 10,
            bind_addr: "127.0.0.1:6666".to_string(),
            worker_pool_size: 10,
            accept_timeout: Duration::from_secs(5),
            manifest_path: None,
            refresh_interval: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_implementation() {
        let config = ServerConfig::default();
        assert_eq!(config.cleanup_frequency, Duration::from_secs(60));
        assert_eq!(config.metrics_interval, Duration::from_secs(60));
        assert_eq!(config.worker_pool_size, 10);
        assert_eq!(config.accept_timeout, Duration::from_secs(5));
        assert_eq!(config.max_backups, 10);
    }
}
