//! A single named keyspace: a flat map of key to [`Record`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::record::Record;

/// Bare concurrent key/value storage for one store. Expiry, readonly
/// enforcement and backup rotation are [`KvEngine`](super::KvEngine)
/// concerns, not this type's.
#[derive(Debug, Default)]
pub struct Store {
    entries: DashMap<String, Record>,
}

impl Store {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.entries.get(key).map(|r| r.clone())
    }

    pub fn put(&self, key: String, record: Record) {
        self.entries.insert(key, record);
    }

    pub fn remove(&self, key: &str) -> Option<Record> {
        self.entries.remove(key).map(|(_, r)| r)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A point-in-time snapshot of every key/record pair, used for backup
    /// rotation. Takes the snapshot under the map's internal sharding locks
    /// but returns owned data so the caller can write it to disk without
    /// holding any lock.
    pub fn snapshot(&self) -> Vec<(String, Record)> {
        self.entries.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    /// Removes every key for which `predicate` returns `true`, returning how
    /// many were removed.
    pub fn retain(&self, mut predicate: impl FnMut(&str, &Record) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, v| predicate(k, v));
        before - self.entries.len()
    }

    /// Inspects and replaces `key`'s record as one atomic step, holding the
    /// shard's internal lock for the whole closure so a concurrent caller
    /// can never observe or act on the value this closure read. This is what
    /// makes `KvEngine::add_key`/`edit_key` race-free check-then-write under
    /// concurrent callers touching the same key.
    pub fn update_atomic<T, E>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Record>) -> Result<(Record, T), E>,
    ) -> Result<T, E> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (new_record, ret) = f(Some(occupied.get()))?;
                *occupied.get_mut() = new_record;
                Ok(ret)
            }
            Entry::Vacant(vacant) => {
                let (new_record, ret) = f(None)?;
                vacant.insert(new_record);
                Ok(ret)
            }
        }
    }

    /// Like [`Store::update_atomic`] but the closure decides whether to
    /// remove the entry instead of always writing a replacement; used by
    /// `delete_key`'s readonly-then-remove check.
    pub fn remove_atomic<T, E>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&Record>) -> Result<(bool, T), E>,
    ) -> Result<T, E> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let (should_remove, ret) = f(Some(occupied.get()))?;
                if should_remove {
                    occupied.remove();
                }
                Ok(ret)
            }
            Entry::Vacant(_) => {
                let (_, ret) = f(None)?;
                Ok(ret)
            }
        }
    }
}
