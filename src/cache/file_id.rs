//! Per-share file-id cache.
//!
//! File handles carry 32-bit driver file ids; the driver works on
//! paths. This cache keeps the two joined up in both directions.
//! Entries are bounded by an LRU policy: on a miss the resolution layer
//! re-derives the path through the driver's file-id lookup when the
//! share supports it, so eviction never makes a handle permanently
//! unusable on such shares. Last insertion wins when an id is re-added
//! with a different path.

use std::sync::Arc;

use moka::sync::Cache;

/// Default bound on cached id/path pairs per share.
pub const DEFAULT_CAPACITY: u64 = 64 * 1024;

/// Bidirectional `file_id <-> path` cache. Reads are lock-free;
/// writers serialize per internal shard.
pub struct FileIdCache {
    paths: Cache<u32, Arc<str>>,
    ids: Cache<Arc<str>, u32>,
}

impl FileIdCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            paths: Cache::builder().max_capacity(capacity).build(),
            ids: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Associates `id` with `path`, replacing any previous association
    /// of either key.
    pub fn add_path(&self, id: u32, path: &str) {
        if let Some(old) = self.paths.get(&id) {
            if &*old != path {
                self.ids.invalidate(&old);
            }
        }
        let shared: Arc<str> = Arc::from(path);
        self.paths.insert(id, shared.clone());
        self.ids.insert(shared, id);
    }

    /// Path most recently associated with `id`.
    pub fn find_path(&self, id: u32) -> Option<Arc<str>> {
        self.paths.get(&id)
    }

    /// Id most recently associated with `path`.
    pub fn find_id(&self, path: &str) -> Option<u32> {
        self.ids.get(path)
    }

    /// Drops the association for `id`.
    pub fn delete_path(&self, id: u32) {
        if let Some(path) = self.paths.get(&id) {
            self.ids.invalidate(&path);
        }
        self.paths.invalidate(&id);
    }
}

impl Default for FileIdCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
