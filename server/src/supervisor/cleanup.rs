//! Periodic sweep that deletes expired keys from every store and rotates
//! that store's on-disk backup.

use std::sync::Arc;

use kvault_core::Clock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::{BackupRotator, KvEngine};

/// Runs until `token` is cancelled. Each pass walks every store, removes
/// entries whose deadline has passed, and rotates a backup for any store
/// that had at least one live key. Sleeps `interval` between passes,
/// matching the reference implementation's `shutdown_event.wait(interval)`
/// pattern (wait after the pass, not before).
pub async fn run(engine: Arc<KvEngine>, backups: Arc<BackupRotator>, clock: Arc<dyn Clock>, interval: std::time::Duration, token: CancellationToken) {
    loop {
        sweep_once(&engine, &backups, clock.as_ref());

        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

fn sweep_once(engine: &KvEngine, backups: &BackupRotator, clock: &dyn Clock) {
    let now = clock.now();
    for (name, store) in engine.all_stores() {
        let removed = store.retain(|_, record| !record.is_expired(now));
        if removed > 0 {
            debug!(store = %name, removed, "cleanup removed expired keys");
        }
        let snapshot = store.snapshot();
        if !snapshot.is_empty() {
            backups.rotate(&name, snapshot);
        }
    }
}
