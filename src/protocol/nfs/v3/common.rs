//! Shared resolution and gating helpers used by the procedure
//! handlers: opaque handle to share-relative path, open-file
//! acquisition through the session cache, and the writability gate
//! applied before any mutation reaches the driver.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::open_file::FileRef;
use crate::cache::search::SearchRef;
use crate::driver::{DiskDriver, FileAccess, OpenParams};
use crate::protocol::nfs::cookie;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::{self, HandleKind, ID_NONE};
use crate::protocol::xdr::nfs3::{filename3, nfs_fh3};
use crate::session::{Session, TreeConnection, DBG_FILE_CACHE, DBG_SEARCH};
use crate::share::{Share, ShareRegistry};

/// Longest name accepted in a directory operation; also advertised by
/// PATHCONF.
pub const MAX_NAME_LEN: usize = 255;

/// A handle resolved against the share registry and the file-id cache.
pub struct Resolved {
    pub tree: Arc<TreeConnection>,
    pub kind: HandleKind,
    /// Directory id carried by the handle; [`ID_NONE`] when absent.
    pub dir_id: u32,
    /// File id carried by the handle; [`ID_NONE`] for non-file kinds.
    pub file_id: u32,
    /// Share-relative path of the object the handle names.
    pub path: String,
}

impl Resolved {
    pub fn share(&self) -> &Arc<Share> {
        self.tree.share()
    }

    pub fn driver(&self) -> Arc<dyn DiskDriver> {
        self.share().driver().clone()
    }

    /// Filesystem id reported in attributes for this share.
    pub fn fsid(&self) -> u64 {
        u64::from(self.share().id())
    }
}

/// Resolves a client handle to a share, tree connection and path.
///
/// Structural problems answer `BadHandle`; a well-formed handle whose
/// object cannot be located (unknown share, or a file id missing from
/// the cache on a share without file-id lookup) answers `Stale`.
pub async fn resolve_handle(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<Resolved, NfsError> {
    let kind = handle::kind_of(fh).ok_or(NfsError::BadHandle)?;
    let share_id = handle::unpack_share_id(fh);
    let share = shares.find(share_id).ok_or(NfsError::Stale)?;
    let tree = match session.find_connection(share_id) {
        Some(tree) => tree,
        None => session.add_connection(&share),
    };

    let dir_id = handle::unpack_directory_id(fh);
    let file_id = handle::unpack_file_id(fh);
    let path = match kind {
        HandleKind::Share => "/".to_string(),
        HandleKind::Directory => {
            if dir_id == ID_NONE {
                return Err(NfsError::BadHandle);
            }
            resolve_id_to_path(session, &tree, dir_id, ID_NONE).await?
        }
        HandleKind::File => {
            if file_id == ID_NONE || file_id == 0 {
                return Err(NfsError::BadHandle);
            }
            resolve_id_to_path(session, &tree, file_id, dir_id).await?
        }
    };

    Ok(Resolved { tree, kind, dir_id, file_id, path })
}

/// Turns a file id into a path: file-id cache first, then the driver's
/// file-id lookup when the share supports it. A miss with no lookup
/// support means the cache went cold (typically a server restart) and
/// the handle is stale.
async fn resolve_id_to_path(
    session: &Session,
    tree: &Arc<TreeConnection>,
    id: u32,
    dir_hint: u32,
) -> Result<String, NfsError> {
    let share = tree.share();
    if let Some(path) = share.file_ids().find_path(id) {
        return Ok(path.to_string());
    }
    if !share.has_file_id_support() {
        return Err(NfsError::Stale);
    }
    let driver = share.driver().clone();
    let path = match driver.build_path_for_file_id(session, tree, dir_hint, id).await {
        Ok(path) => path,
        Err(err) => {
            debug!(id, %err, "file-id lookup failed, handle is stale");
            return Err(NfsError::Stale);
        }
    };
    share.file_ids().add_path(id, &path);
    Ok(path)
}

/// Rejects mutation through a tree connection without write access.
/// Applied before the driver is consulted.
pub fn require_writable(tree: &TreeConnection) -> Result<(), NfsError> {
    if tree.is_writable() {
        Ok(())
    } else {
        Err(NfsError::Access)
    }
}

/// Validates a client-supplied name and joins it onto a directory path.
pub fn join_child(dir: &str, name: &filename3) -> Result<String, NfsError> {
    let name = std::str::from_utf8(name.as_bytes()).map_err(|_| NfsError::InVal)?;
    if name.is_empty() || name == "." || name == ".." {
        return Err(NfsError::InVal);
    }
    if name.len() > MAX_NAME_LEN || name.contains('/') || name.contains('\0') {
        return Err(NfsError::InVal);
    }
    if dir == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{dir}/{name}"))
    }
}

/// Parent directory of a share-relative path; the root is its own
/// parent.
pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Fetches the open file for a resolved handle, opening and caching it
/// on a miss. A cached grant that does not cover `access` is upgraded
/// by reopening read-write; the cache replaces the entry.
pub async fn open_network_file(
    session: &Session,
    resolved: &Resolved,
    access: FileAccess,
) -> Result<FileRef, NfsError> {
    let cache = session.file_cache();
    if let Some((file, granted)) = cache.find(resolved.file_id) {
        if granted.covers(access) {
            return Ok(file);
        }
        if session.has_debug(DBG_FILE_CACHE) {
            debug!(file_id = resolved.file_id, "upgrading cached file to read-write");
        }
    }

    let params = OpenParams::open(resolved.path.clone(), access);
    let file = resolved.driver().open_file(session, &resolved.tree, &params).await?;
    Ok(cache.add(file, resolved.tree.clone()))
}

/// Evicts any cached open file for `file_id`, handing it back to its
/// driver. Used by Remove and Rename so the acknowledged state never
/// keeps a path-based open file alive.
pub async fn evict_open_file(session: &Session, file_id: u32) {
    let Some((file, tree)) = session.file_cache().remove(file_id) else {
        return;
    };
    let mut guard = file.lock().await;
    if guard.open {
        let driver = tree.share().driver().clone();
        if let Err(err) = driver.close_file(session, &tree, &mut guard).await {
            warn!(file_id, path = %guard.path, %err, "close of evicted file failed");
        }
        guard.open = false;
    }
}

/// Serializes into the reply buffer. Reply buffers are in-memory, so a
/// failure here is an engine fault, not a client error.
pub fn put<T: crate::protocol::xdr::Serialize>(
    reply: &mut impl std::io::Write,
    value: &T,
) -> Result<(), NfsError> {
    value.serialize(reply).map_err(|_| NfsError::ServerFault)
}

/// Where a directory listing should continue from, derived from the
/// incoming cookie.
pub enum SearchStart {
    /// Cookie 0: emit `.` and `..`, then entries from the top.
    FromTop,
    /// The client consumed `.`; emit `..`, then entries from the top.
    AfterDot,
    /// The client consumed `..`; entries from the top.
    AfterDotDot,
    /// Continue at a real resume id.
    Resume(u32),
}

impl SearchStart {
    fn for_resume(resume_id: u32) -> Self {
        match resume_id {
            cookie::COOKIE_DOT => SearchStart::AfterDot,
            cookie::COOKIE_DOT_DOT => SearchStart::AfterDotDot,
            resume => SearchStart::Resume(resume),
        }
    }
}

/// Finds or creates the search a READDIR cookie refers to.
///
/// Cookie 0 starts a fresh search in a new slot. A cookie whose slot
/// has been deallocated (or belongs to a previous search) silently
/// restarts the same enumeration in a fresh slot; the reply's verifier
/// is the current directory mtime, so the client converges on the new
/// state.
pub async fn acquire_search(
    session: &Session,
    resolved: &Resolved,
    incoming_cookie: u64,
) -> Result<(u8, SearchRef, SearchStart), NfsError> {
    if incoming_cookie == 0 {
        let context = resolved.driver().start_search(session, &resolved.tree, &resolved.path).await?;
        let slot = session.allocate_search_slot(context)?;
        let search = session.search_context(slot).ok_or(NfsError::ServerFault)?;
        return Ok((slot, search, SearchStart::FromTop));
    }

    let slot = cookie::slot_of(incoming_cookie);
    let resume = cookie::resume_of(incoming_cookie);
    match session.search_context(slot) {
        Some(search) => Ok((slot, search, SearchStart::for_resume(resume))),
        None => {
            if session.has_debug(DBG_SEARCH) {
                debug!(slot, resume, "search slot gone, restarting enumeration");
            }
            let context =
                resolved.driver().start_search(session, &resolved.tree, &resolved.path).await?;
            let slot = session.allocate_search_slot(context)?;
            let search = session.search_context(slot).ok_or(NfsError::ServerFault)?;
            Ok((slot, search, SearchStart::for_resume(resume)))
        }
    }
}
