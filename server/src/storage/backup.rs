//! Rotating on-disk JSON backups for a single store.
//!
//! Rotation shifts `<store>.backup.(n-1).json` to `<store>.backup.n.json`
//! for `n` from `max_backups` down to `2`, drops the prior `max_backups`
//! file, and writes the current snapshot as `<store>.backup.1.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kvault_core::Value;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::record::Record;

#[derive(Debug, Serialize, Deserialize)]
struct BackupEntry {
    key: String,
    value: Value,
    exp_time: i64,
    readonly: bool,
    #[serde(default)]
    extras: BTreeMap<String, Value>,
}

pub struct BackupRotator {
    dir: PathBuf,
    max_backups: u32,
}

impl BackupRotator {
    pub fn new(dir: impl Into<PathBuf>, max_backups: u32) -> Self {
        Self { dir: dir.into(), max_backups }
    }

    fn path_for(&self, store_name: &str, n: u32) -> PathBuf {
        self.dir.join(format!("{store_name}.backup.{n}.json"))
    }

    /// Rotates existing backup files and writes `snapshot` as the new
    /// `backup.1.json`. Filesystem errors are logged and swallowed -- a
    /// failed backup must never take down the store it backs.
    pub fn rotate(&self, store_name: &str, snapshot: Vec<(String, Record)>) {
        if let Err(e) = self.try_rotate(store_name, &snapshot) {
            error!(store = store_name, error = %e, "backup rotation failed");
        }
    }

    fn try_rotate(&self, store_name: &str, snapshot: &[(String, Record)]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        for n in (2..=self.max_backups).rev() {
            let from = self.path_for(store_name, n - 1);
            let to = self.path_for(store_name, n);
            if from.exists() {
                std::fs::rename(&from, &to)?;
            }
        }

        let entries: Vec<BackupEntry> = snapshot
            .iter()
            .map(|(key, record)| BackupEntry {
                key: key.clone(),
                value: record.value.clone(),
                exp_time: record.exp_time,
                readonly: record.readonly,
                extras: record.extras.clone(),
            })
            .collect();

        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Write-then-rename rather than a direct write: a crash mid-write
        // leaves only the `.tmp` file behind, never a half-written
        // `backup.1.json` in place of a good one.
        let target = self.path_for(store_name, 1);
        let tmp = self.path_for(store_name, 1).with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &target)?;
        info!(store = store_name, entries = entries.len(), "backup rotated");
        Ok(())
    }

    /// Loads the most recent rotation (`backup.1.json`) only, per the
    /// reference implementation's `load_from_backup` contract. Older
    /// rotations are retained on disk but never auto-replayed.
    pub fn load_latest(&self, store_name: &str) -> std::io::Result<Vec<(String, Record)>> {
        let path = self.path_for(store_name, 1);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(path)?;
        let entries: Vec<BackupEntry> = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(entries
            .into_iter()
            .map(|e| (e.key, Record::new(e.value, e.exp_time, e.readonly, e.extras)))
            .collect())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
