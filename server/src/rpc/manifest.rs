//! YAML service manifest with mtime-based hot reload.
//!
//! The manifest just lists which service URIs should be active; reload is
//! additive only (newly-listed services are registered, already-registered
//! ones are left alone even if removed from the file) per `DESIGN.md`'s
//! Open Question #4 decision -- this avoids tearing down a stateful
//! facade's in-memory handle out from under in-flight callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashSet;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    services: Vec<String>,
}

/// Tracks which service names have been seen across reloads. Callers
/// (typically the code that wires facades into the [`DispatchTable`](super::dispatch::DispatchTable))
/// consult this to decide what's newly available.
pub struct ManifestWatcher {
    path: PathBuf,
    known_services: Arc<DashSet<String>>,
    last_mtime: std::sync::Mutex<Option<SystemTime>>,
}

impl ManifestWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), known_services: Arc::new(DashSet::new()), last_mtime: std::sync::Mutex::new(None) }
    }

    pub fn known_services(&self) -> Arc<DashSet<String>> {
        Arc::clone(&self.known_services)
    }

    /// Loads the manifest once, adding any service name not already known.
    /// Returns the newly-added names.
    pub fn reload_once(&self) -> Vec<String> {
        let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        {
            let mut last = self.last_mtime.lock().expect("manifest mtime mutex poisoned");
            if mtime.is_some() && *last == mtime {
                return Vec::new();
            }
            *last = mtime;
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read service manifest");
                return Vec::new();
            }
        };
        let parsed: ManifestFile = match serde_yaml::from_str(&contents) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to parse service manifest");
                return Vec::new();
            }
        };

        let mut added = Vec::new();
        for name in parsed.services {
            if self.known_services.insert(name.clone()) {
                info!(service = %name, "service added from manifest");
                added.push(name);
            }
        }
        added
    }

    /// Polls the manifest's mtime every `interval` until `token` is
    /// cancelled, reloading whenever it changes.
    pub async fn run(self: Arc<Self>, interval: std::time::Duration, token: CancellationToken) {
        self.reload_once();
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    self.reload_once();
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reload_adds_new_services_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "services:\n  - secrets\n  - paths\n").unwrap();

        let watcher = ManifestWatcher::new(file.path());
        let added = watcher.reload_once();
        assert_eq!(added, vec!["secrets".to_string(), "paths".to_string()]);
        assert!(watcher.known_services().contains("secrets"));

        // Rewrite the file dropping "paths" and adding "pipelines" -- "paths"
        // must remain known even though it is no longer listed.
        let mut file2 = std::fs::OpenOptions::new().write(true).truncate(true).open(file.path()).unwrap();
        writeln!(file2, "services:\n  - secrets\n  - pipelines\n").unwrap();
        drop(file2);

        // Force a distinct mtime check by clearing the cached value.
        *watcher.last_mtime.lock().unwrap() = None;
        let added = watcher.reload_once();
        assert_eq!(added, vec!["pipelines".to_string()]);
        assert!(watcher.known_services().contains("paths"), "previously-known services are never dropped");
    }

    #[test]
    fn unreadable_manifest_yields_no_additions() {
        let watcher = ManifestWatcher::new("/nonexistent/path/manifest.yaml");
        assert!(watcher.reload_once().is_empty());
    }
}
