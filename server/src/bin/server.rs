//! Process entry point: parses CLI arguments, wires the engine, facades,
//! task supervisor and RPC server together, and runs until SIGINT/SIGTERM.
//!
//! Grounded on `original_source/hh/core/server.py`'s `RemoteObjectServer`
//! startup sequence (`load_services` once before `start_server`, a
//! background `refresh_services` thread, signal-driven
//! `graceful_shutdown`), adapted to the explicit dispatch table and
//! `TaskSupervisor` this port uses in place of reflective service loading.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kvault_core::{FernetKey, SystemClock};
use kvault_server::facades::{FixedKeyResolver, InternalMetricsFacade, PathsFacade, PipelinesFacade, SecretsFacade};
use kvault_server::rpc::services::build_dispatch_table;
use kvault_server::rpc::{ManifestWatcher, RpcConfig, RpcServer, ShutdownController};
use kvault_server::storage::{BackupRotator, KvEngine};
use kvault_server::supervisor::{ServerConfig, TaskSupervisor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kvault-server")]
#[command(about = "Multi-store key/value server with TTL, backups, and RPC dispatch")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "KVAULT_BIND_ADDR", default_value = "127.0.0.1:6666")]
    bind_addr: String,

    /// Directory rotated JSON backups are written to and restored from.
    #[arg(long, env = "KVAULT_BACKUP_DIR", default_value = "./backups")]
    backup_dir: PathBuf,

    /// Path to the YAML service manifest. When set, it is polled for
    /// additions every `refresh-interval`.
    #[arg(long, env = "KVAULT_MANIFEST_PATH")]
    manifest_path: Option<PathBuf>,

    /// Symmetric key (url-safe base64, 32 bytes) used by the secrets
    /// facade. Generated fresh when omitted -- fine for development, but
    /// means secrets written by a prior run become undecryptable.
    #[arg(long, env = "KVAULT_SECRETS_KEY")]
    secrets_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let args = Args::parse();
    let config = ServerConfig { bind_addr: args.bind_addr.clone(), backup_dir: args.backup_dir.clone(), manifest_path: args.manifest_path.clone(), ..ServerConfig::default() };

    let clock: Arc<dyn kvault_core::Clock> = Arc::new(SystemClock);
    let engine = Arc::new(KvEngine::new(clock.clone()));
    let backups = Arc::new(BackupRotator::new(&config.backup_dir, config.max_backups));

    let secrets_key = match &args.secrets_key {
        Some(encoded) => FernetKey::from_base64(encoded).map_err(|e| anyhow::anyhow!("invalid --secrets-key: {e}"))?,
        None => {
            let generated = FernetKey::generate();
            warn!("no --secrets-key supplied, generated an ephemeral key for this run");
            FernetKey::from_base64(&generated).expect("freshly generated key parses")
        }
    };

    let secrets = Arc::new(SecretsFacade::new(Arc::clone(&engine), clock.clone(), Arc::new(FixedKeyResolver::new(secrets_key))));
    let paths = Arc::new(PathsFacade::new(Arc::clone(&engine)));
    let pipelines = Arc::new(PipelinesFacade::new(Arc::clone(&engine)));
    let internal = Arc::new(InternalMetricsFacade::new(Arc::clone(&engine), clock.clone()));

    restore_known_stores(&engine, &backups);

    let dispatch = Arc::new(build_dispatch_table(Arc::clone(&engine), secrets, paths, Arc::clone(&pipelines), Arc::clone(&internal)));
    let shutdown = Arc::new(ShutdownController::new());
    let supervisor = Arc::new(TaskSupervisor::new());

    register_background_tasks(&supervisor, &engine, &backups, clock, internal, &config);
    supervisor.start_tasks(None);

    let rpc_config = RpcConfig::from(&config);
    let server = RpcServer::new(rpc_config, Arc::clone(&dispatch), Arc::clone(&shutdown));
    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "failed to bind rpc listener");
            return Err(e.into());
        }
    };
    shutdown.set_ready();

    let serve_handle = tokio::spawn(async move { server.serve(listener).await });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, shutting down gracefully");
    shutdown.trigger_shutdown();
    shutdown.wait_for_drain(Duration::from_secs(30)).await;
    let _ = serve_handle.await;
    supervisor.shutdown(None).await;

    info!("server shutdown complete");
    Ok(())
}

/// Rehydrates every facade-owned store from its most recent backup, if one
/// exists. Stores with no `backup.1.json` start empty, matching a fresh
/// `create_store` call.
fn restore_known_stores(engine: &KvEngine, backups: &BackupRotator) {
    for store_name in [kvault_server::facades::secrets::SECRETS_STORE, kvault_server::facades::paths::PATHS_STORE, kvault_server::facades::pipelines::PIPELINES_STORE, kvault_server::facades::internal::METRICS_STORE] {
        match backups.load_latest(store_name) {
            Ok(records) if !records.is_empty() => {
                let count = records.len();
                if let Err(e) = engine.restore_store(store_name, records) {
                    error!(store = store_name, error = %e, "failed to restore store from backup");
                } else {
                    info!(store = store_name, records = count, "restored store from backup");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(store = store_name, error = %e, "failed to read backup for restore"),
        }
    }
}

fn register_background_tasks(
    supervisor: &Arc<TaskSupervisor>,
    engine: &Arc<KvEngine>,
    backups: &Arc<BackupRotator>,
    clock: Arc<dyn kvault_core::Clock>,
    internal: Arc<InternalMetricsFacade>,
    config: &ServerConfig,
) {
    let engine = Arc::clone(engine);
    let backups = Arc::clone(backups);
    let cleanup_clock = clock.clone();
    let cleanup_interval = config.cleanup_frequency;
    supervisor.register(
        "cleanup",
        Arc::new(move |token: CancellationToken| {
            let engine = Arc::clone(&engine);
            let backups = Arc::clone(&backups);
            let clock = cleanup_clock.clone();
            tokio::spawn(kvault_server::supervisor::cleanup::run(engine, backups, clock, cleanup_interval, token))
        }),
    );

    let metrics_interval = config.metrics_interval;
    let supervisor_handle = Arc::clone(supervisor);
    supervisor.register(
        "metrics",
        Arc::new(move |token: CancellationToken| {
            let internal = Arc::clone(&internal);
            let supervisor_handle = Arc::clone(&supervisor_handle);
            tokio::spawn(kvault_server::supervisor::metrics::run(internal, supervisor_handle, metrics_interval, token))
        }),
    );

    if let Some(manifest_path) = config.manifest_path.clone() {
        let watcher = Arc::new(ManifestWatcher::new(manifest_path));
        let refresh_interval = config.refresh_interval;
        supervisor.register(
            "manifest-refresh",
            Arc::new(move |token: CancellationToken| {
                let watcher = Arc::clone(&watcher);
                tokio::spawn(async move { watcher.run(refresh_interval, token).await })
            }),
        );
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
