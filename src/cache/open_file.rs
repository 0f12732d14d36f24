//! Per-session cache of open [`NetworkFile`]s.
//!
//! NFS procedures are stateless on the wire, but opening on every READ
//! and WRITE would be ruinous, so the session keeps files open keyed by
//! file id. Each entry carries its own `tokio` mutex: I/O on a given
//! file is serialized by holding that monitor across the driver call,
//! while the cache's own map lock is only ever held for map surgery.
//! Entries also remember the tree connection they were opened under so
//! eviction can hand the file back to the right driver.
//!
//! The granted access recorded at insert time lets callers detect that
//! a cached read-only file cannot satisfy a write; they reopen with
//! wider access and [`OpenFileCache::add`] replaces the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as FileMutex;

use crate::driver::{FileAccess, NetworkFile};
use crate::session::TreeConnection;

/// A cached open file behind its I/O monitor.
pub type FileRef = Arc<FileMutex<NetworkFile>>;

/// An evicted entry: the file plus the tree connection to close it
/// under.
pub type Evicted = (FileRef, Arc<TreeConnection>);

struct CacheEntry {
    file: FileRef,
    tree: Arc<TreeConnection>,
    access: FileAccess,
    last_used: Instant,
}

/// Open-file cache for one session.
#[derive(Default)]
pub struct OpenFileCache {
    entries: Mutex<HashMap<u32, CacheEntry>>,
}

impl OpenFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `file`, replacing any entry with the same id, and
    /// returns the shared reference. Replacement is how an access
    /// upgrade lands: the reopened read-write file takes the slot of
    /// the read-only one.
    pub fn add(&self, file: NetworkFile, tree: Arc<TreeConnection>) -> FileRef {
        let id = file.file_id;
        let access = file.access;
        let shared: FileRef = Arc::new(FileMutex::new(file));
        let entry = CacheEntry { file: shared.clone(), tree, access, last_used: Instant::now() };
        self.entries.lock().expect("open-file cache poisoned").insert(id, entry);
        shared
    }

    /// Looks up an open file and the access it was granted. Refreshes
    /// the idle clock.
    pub fn find(&self, file_id: u32) -> Option<(FileRef, FileAccess)> {
        let mut entries = self.entries.lock().expect("open-file cache poisoned");
        entries.get_mut(&file_id).map(|entry| {
            entry.last_used = Instant::now();
            (entry.file.clone(), entry.access)
        })
    }

    /// Removes and returns the entry for `file_id`. The caller owns
    /// handing the file back to the driver.
    pub fn remove(&self, file_id: u32) -> Option<Evicted> {
        self.entries
            .lock()
            .expect("open-file cache poisoned")
            .remove(&file_id)
            .map(|entry| (entry.file, entry.tree))
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("open-file cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every entry idle for longer than `max_idle` and returns
    /// the files for closing.
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<Evicted> {
        let mut entries = self.entries.lock().expect("open-file cache poisoned");
        let now = Instant::now();
        let expired: Vec<u32> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) > max_idle)
            .map(|(&id, _)| id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|entry| (entry.file, entry.tree))
            .collect()
    }

    /// Empties the cache, returning every file for closing. Used on
    /// session teardown.
    pub fn drain(&self) -> Vec<Evicted> {
        let mut entries = self.entries.lock().expect("open-file cache poisoned");
        entries.drain().map(|(_, entry)| (entry.file, entry.tree)).collect()
    }
}
