//! Client sessions and their per-session state.
//!
//! A [`Session`] binds one client to its open-file cache, search slot
//! table, tree connections, and the per-request driver transaction. A
//! session may be dispatching several requests concurrently; all of its
//! state is therefore behind interior locks, none of which are held
//! across driver calls except the per-file and per-search monitors that
//! exist precisely to serialize those calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::cache::search::SearchRef;
use crate::cache::{OpenFileCache, SearchSlotTable, SlotTableFull};
use crate::driver::{DriverTransaction, SearchContext};
use crate::share::Share;

/// Session debug flag: log procedure dispatch.
pub const DBG_DISPATCH: u32 = 0x0001;
/// Session debug flag: log directory search activity.
pub const DBG_SEARCH: u32 = 0x0002;
/// Session debug flag: log open-file cache activity.
pub const DBG_FILE_CACHE: u32 = 0x0004;

/// A session's connection to one share. Created from the share's
/// template on first use; writability may only ever be narrowed from
/// the template.
pub struct TreeConnection {
    share: Arc<Share>,
    writable: bool,
}

impl TreeConnection {
    pub fn new(share: Arc<Share>) -> Self {
        let writable = share.is_writable();
        Self { share, writable }
    }

    /// A connection that refuses mutation regardless of the share
    /// template.
    pub fn read_only(share: Arc<Share>) -> Self {
        Self { share, writable: false }
    }

    pub fn share(&self) -> &Arc<Share> {
        &self.share
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

/// Per-client state. One instance per connected client, shared across
/// that client's in-flight requests.
pub struct Session {
    id: u64,
    remote_addr: String,
    file_cache: OpenFileCache,
    searches: SearchSlotTable,
    trees: RwLock<HashMap<u32, Arc<TreeConnection>>>,
    transaction: Mutex<Option<Box<dyn DriverTransaction>>>,
    debug_mask: u32,
}

impl Session {
    pub fn new(id: u64, remote_addr: impl Into<String>) -> Self {
        Self::with_debug(id, remote_addr, 0)
    }

    pub fn with_debug(id: u64, remote_addr: impl Into<String>, debug_mask: u32) -> Self {
        Self {
            id,
            remote_addr: remote_addr.into(),
            file_cache: OpenFileCache::new(),
            searches: SearchSlotTable::new(),
            trees: RwLock::new(HashMap::new()),
            transaction: Mutex::new(None),
            debug_mask,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn file_cache(&self) -> &OpenFileCache {
        &self.file_cache
    }

    pub fn has_debug(&self, flag: u32) -> bool {
        self.debug_mask & flag != 0
    }

    /// The search in `slot`, if it is still allocated.
    pub fn search_context(&self, slot: u8) -> Option<SearchRef> {
        self.searches.get(slot)
    }

    /// Allocates a slot for a freshly started search.
    pub fn allocate_search_slot(
        &self,
        context: Box<dyn SearchContext>,
    ) -> Result<u8, SlotTableFull> {
        self.searches.allocate(context)
    }

    /// Frees a slot, returning the search for closing.
    pub fn deallocate_search_slot(&self, slot: u8) -> Option<SearchRef> {
        self.searches.deallocate(slot)
    }

    /// The session's connection to `share_id`, if one exists.
    pub fn find_connection(&self, share_id: u32) -> Option<Arc<TreeConnection>> {
        self.trees.read().expect("tree table poisoned").get(&share_id).cloned()
    }

    /// Returns the connection to `share`, instantiating it from the
    /// share template on first use.
    pub fn add_connection(&self, share: &Arc<Share>) -> Arc<TreeConnection> {
        let mut trees = self.trees.write().expect("tree table poisoned");
        trees
            .entry(share.id())
            .or_insert_with(|| Arc::new(TreeConnection::new(share.clone())))
            .clone()
    }

    /// Attaches a driver transaction for the current request. A driver
    /// attaching over a live transaction indicates a missed
    /// `end_transaction`; the older one is discarded with a warning.
    pub fn begin_transaction(&self, transaction: Box<dyn DriverTransaction>) {
        let mut slot = self.transaction.lock().expect("transaction slot poisoned");
        if slot.is_some() {
            warn!(session = self.id, "transaction attached over a pending one");
        }
        *slot = Some(transaction);
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.lock().expect("transaction slot poisoned").is_some()
    }

    /// Ends the request's transaction, committing when the handler
    /// succeeded and rolling back otherwise. Called by the dispatcher
    /// after every handler, whether or not one was attached.
    pub async fn end_transaction(&self, commit: bool) {
        let pending = self.transaction.lock().expect("transaction slot poisoned").take();
        let Some(transaction) = pending else {
            return;
        };
        if commit {
            if let Err(err) = transaction.commit().await {
                warn!(session = self.id, %err, "transaction commit failed");
            }
        } else {
            debug!(session = self.id, "rolling back request transaction");
            transaction.rollback().await;
        }
    }

    /// Tears the session down: closes every active search and returns
    /// every cached open file to its driver.
    pub async fn close(&self) {
        for search in self.searches.drain() {
            search.lock().await.close_search().await;
        }
        for (file, tree) in self.file_cache.drain() {
            let mut guard = file.lock().await;
            if guard.open {
                let driver = tree.share().driver().clone();
                if let Err(err) = driver.close_file(self, &tree, &mut guard).await {
                    warn!(session = self.id, path = %guard.path, %err, "close on teardown failed");
                }
                guard.open = false;
            }
        }
    }
}
