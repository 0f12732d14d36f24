//! Shared test fixture: an in-memory filesystem driver and a harness
//! that drives the dispatcher with XDR-encoded calls, the way the
//! transport would.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nfs_harbor::driver::{
    DiskDriver, DiskSpace, DriverError, FileAccess, FileExistsStatus, FileInfo, FileTimeMs,
    FileType, NetworkFile, OpenParams, Result as DriverResult, SearchContext, SetInfo,
};
use nfs_harbor::process_request;
use nfs_harbor::protocol::nfs::handle;
use nfs_harbor::protocol::rpc::{PacketPool, RpcPacket};
use nfs_harbor::session::{Session, TreeConnection};
use nfs_harbor::share::{Share, ShareRegistry};
use nfs_harbor::xdr::rpc::{accept_body, call_body, reply_msg};
use nfs_harbor::xdr::{deserialize, nfs3, Deserialize, Serialize};

/// Base timestamp used for freshly created test nodes, far from zero
/// so second/millisecond conversions are exercised.
pub const BASE_TIME_MS: u64 = 1_700_000_000_000;

#[derive(Clone, Debug)]
pub enum NodeKind {
    File(Vec<u8>),
    Directory,
    Symlink(String),
}

#[derive(Clone, Debug)]
pub struct MemNode {
    pub file_id: u32,
    pub kind: NodeKind,
    pub mode: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub mtime: FileTimeMs,
    pub flags: u32,
}

struct MemState {
    nodes: BTreeMap<String, MemNode>,
    next_id: u32,
    disk_full: bool,
    closed_paths: Vec<String>,
}

/// In-memory driver backing the tests. Paths are share-relative and
/// start with `/`; ids are assigned sequentially from 1 (the root).
pub struct MemDriver {
    state: Mutex<MemState>,
    symlinks: bool,
    file_id_lookup: bool,
    disk: Option<DiskSpace>,
}

fn parent_str(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn name_str(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

impl MemDriver {
    pub fn new() -> Self {
        Self::with_options(false, false)
    }

    pub fn with_options(symlinks: bool, file_id_lookup: bool) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            MemNode {
                file_id: 1,
                kind: NodeKind::Directory,
                mode: None,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        Self {
            state: Mutex::new(MemState {
                nodes,
                next_id: 2,
                disk_full: false,
                closed_paths: Vec::new(),
            }),
            symlinks,
            file_id_lookup,
            disk: None,
        }
    }

    pub fn with_disk(mut self, disk: DiskSpace) -> Self {
        self.disk = Some(disk);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemState> {
        self.state.lock().expect("mem driver poisoned")
    }

    /// Seeds a file with explicit id and contents.
    pub fn add_file_with_id(&self, path: &str, file_id: u32, data: &[u8], mode: Option<u32>) {
        let mut state = self.lock();
        state.next_id = state.next_id.max(file_id + 1);
        state.nodes.insert(
            path.to_string(),
            MemNode {
                file_id,
                kind: NodeKind::File(data.to_vec()),
                mode,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
    }

    pub fn add_file(&self, path: &str, data: &[u8]) -> u32 {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            id
        };
        self.add_file_with_id(path, id, data, None);
        id
    }

    pub fn add_dir(&self, path: &str) -> u32 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            path.to_string(),
            MemNode {
                file_id: id,
                kind: NodeKind::Directory,
                mode: None,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        id
    }

    pub fn add_symlink(&self, path: &str, target: &str) -> u32 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            path.to_string(),
            MemNode {
                file_id: id,
                kind: NodeKind::Symlink(target.to_string()),
                mode: None,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        id
    }

    pub fn set_disk_full(&self, full: bool) {
        self.lock().disk_full = full;
    }

    pub fn set_mtime(&self, path: &str, mtime_ms: u64) {
        if let Some(node) = self.lock().nodes.get_mut(path) {
            node.mtime = FileTimeMs(mtime_ms);
        }
    }

    pub fn mtime_of(&self, path: &str) -> u64 {
        self.lock().nodes.get(path).map(|n| n.mtime.as_millis()).unwrap_or(0)
    }

    pub fn node(&self, path: &str) -> Option<MemNode> {
        self.lock().nodes.get(path).cloned()
    }

    pub fn closed_paths(&self) -> Vec<String> {
        self.lock().closed_paths.clone()
    }

    fn touch_parent(state: &mut MemState, path: &str) {
        let parent = parent_str(path).to_string();
        if let Some(node) = state.nodes.get_mut(&parent) {
            node.mtime = FileTimeMs(node.mtime.as_millis() + 1000);
        }
    }

    fn info_for(path: &str, node: &MemNode) -> FileInfo {
        let (file_type, size) = match &node.kind {
            NodeKind::File(data) => (FileType::Regular, data.len() as u64),
            NodeKind::Directory => (FileType::Directory, 0),
            NodeKind::Symlink(target) => (FileType::SymbolicLink, target.len() as u64),
        };
        FileInfo {
            name: if path == "/" { String::new() } else { name_str(path).to_string() },
            file_id: node.file_id,
            size,
            alloc_size: 0,
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            access_time: node.mtime,
            modify_time: node.mtime,
            change_time: node.mtime,
            create_time: node.mtime,
            file_type,
            flags: node.flags,
        }
    }
}

impl Default for MemDriver {
    fn default() -> Self {
        Self::new()
    }
}

struct MemSearch {
    entries: Vec<FileInfo>,
    pos: usize,
    closed: bool,
}

#[async_trait]
impl SearchContext for MemSearch {
    async fn next_file_info(&mut self) -> DriverResult<Option<FileInfo>> {
        if self.pos < self.entries.len() {
            let info = self.entries[self.pos].clone();
            self.pos += 1;
            Ok(Some(info))
        } else {
            Ok(None)
        }
    }

    fn resume_id(&self) -> u32 {
        self.pos as u32
    }

    async fn restart_at(&mut self, resume_id: u32) -> DriverResult<()> {
        self.pos = (resume_id as usize).min(self.entries.len());
        Ok(())
    }

    fn has_more_files(&self) -> bool {
        self.pos < self.entries.len()
    }

    async fn close_search(&mut self) {
        self.closed = true;
    }
}

#[async_trait]
impl DiskDriver for MemDriver {
    async fn file_information(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> DriverResult<FileInfo> {
        let state = self.lock();
        let node = state.nodes.get(path).ok_or(DriverError::NotFound)?;
        Ok(Self::info_for(path, node))
    }

    async fn file_exists(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> FileExistsStatus {
        match self.lock().nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Directory) => FileExistsStatus::DirectoryExists,
            Some(_) => FileExistsStatus::FileExists,
            None => FileExistsStatus::NotExist,
        }
    }

    async fn open_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        params: &OpenParams,
    ) -> DriverResult<NetworkFile> {
        let mut state = self.lock();
        let node = state.nodes.get_mut(&params.path).ok_or(DriverError::NotFound)?;
        let (id, size) = match &mut node.kind {
            NodeKind::File(data) => {
                if params.truncate {
                    data.clear();
                }
                (node.file_id, data.len() as u64)
            }
            NodeKind::Directory => return Err(DriverError::IsADirectory),
            NodeKind::Symlink(_) => return Err(DriverError::InvalidOperation),
        };
        Ok(NetworkFile::new(id, params.path.clone(), params.access, size))
    }

    async fn create_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        params: &OpenParams,
    ) -> DriverResult<NetworkFile> {
        let mut state = self.lock();
        if state.nodes.contains_key(&params.path) {
            return Err(DriverError::AlreadyExists);
        }
        if !matches!(
            state.nodes.get(parent_str(&params.path)).map(|n| &n.kind),
            Some(NodeKind::Directory)
        ) {
            return Err(DriverError::NotFound);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            params.path.clone(),
            MemNode {
                file_id: id,
                kind: NodeKind::File(Vec::new()),
                mode: params.mode,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        Self::touch_parent(&mut state, &params.path);
        Ok(NetworkFile::new(id, params.path.clone(), FileAccess::ReadWrite, 0))
    }

    async fn create_directory(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        params: &OpenParams,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        if state.nodes.contains_key(&params.path) {
            return Err(DriverError::AlreadyExists);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            params.path.clone(),
            MemNode {
                file_id: id,
                kind: NodeKind::Directory,
                mode: params.mode,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        Self::touch_parent(&mut state, &params.path);
        Ok(())
    }

    async fn close_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
    ) -> DriverResult<()> {
        self.lock().closed_paths.push(file.path.clone());
        file.open = false;
        Ok(())
    }

    async fn delete_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        match state.nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Directory) => return Err(DriverError::IsADirectory),
            Some(_) => {}
            None => return Err(DriverError::NotFound),
        }
        state.nodes.remove(path);
        Self::touch_parent(&mut state, path);
        Ok(())
    }

    async fn delete_directory(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        match state.nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Directory) => {}
            Some(_) => return Err(DriverError::NotADirectory),
            None => return Err(DriverError::NotFound),
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        if state.nodes.keys().any(|p| p.starts_with(&prefix)) {
            return Err(DriverError::DirectoryNotEmpty);
        }
        state.nodes.remove(path);
        Self::touch_parent(&mut state, path);
        Ok(())
    }

    async fn rename_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        old_path: &str,
        new_path: &str,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let node = state.nodes.remove(old_path).ok_or(DriverError::NotFound)?;
        let moved_children: Vec<(String, MemNode)> = {
            let prefix = format!("{}/", old_path.trim_end_matches('/'));
            let keys: Vec<String> =
                state.nodes.keys().filter(|p| p.starts_with(&prefix)).cloned().collect();
            keys.into_iter()
                .map(|key| {
                    let child = state.nodes.remove(&key).expect("listed key");
                    let suffix = key[old_path.len()..].to_string();
                    (format!("{new_path}{suffix}"), child)
                })
                .collect()
        };
        state.nodes.insert(new_path.to_string(), node);
        for (key, child) in moved_children {
            state.nodes.insert(key, child);
        }
        Self::touch_parent(&mut state, old_path);
        Self::touch_parent(&mut state, new_path);
        Ok(())
    }

    async fn read_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
        buf: &mut [u8],
        offset: u64,
    ) -> DriverResult<u32> {
        let state = self.lock();
        let node = state.nodes.get(&file.path).ok_or(DriverError::NotFound)?;
        let NodeKind::File(data) = &node.kind else {
            return Err(DriverError::InvalidOperation);
        };
        let start = (offset as usize).min(data.len());
        let end = (start + buf.len()).min(data.len());
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok((end - start) as u32)
    }

    async fn write_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
        data: &[u8],
        offset: u64,
    ) -> DriverResult<u32> {
        let mut state = self.lock();
        if state.disk_full {
            return Err(DriverError::DiskFull);
        }
        let node = state.nodes.get_mut(&file.path).ok_or(DriverError::NotFound)?;
        let NodeKind::File(contents) = &mut node.kind else {
            return Err(DriverError::InvalidOperation);
        };
        let offset = offset as usize;
        if contents.len() < offset + data.len() {
            contents.resize(offset + data.len(), 0);
        }
        contents[offset..offset + data.len()].copy_from_slice(data);
        node.mtime = FileTimeMs(node.mtime.as_millis() + 1000);
        Ok(data.len() as u32)
    }

    async fn truncate_file(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
        size: u64,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let node = state.nodes.get_mut(&file.path).ok_or(DriverError::NotFound)?;
        let NodeKind::File(contents) = &mut node.kind else {
            return Err(DriverError::InvalidOperation);
        };
        contents.resize(size as usize, 0);
        node.mtime = FileTimeMs(node.mtime.as_millis() + 1000);
        Ok(())
    }

    async fn set_file_information(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
        info: &SetInfo,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let node = state.nodes.get_mut(path).ok_or(DriverError::NotFound)?;
        if let Some(mode) = info.mode {
            node.mode = Some(mode);
        }
        if let Some(uid) = info.uid {
            node.uid = uid;
        }
        if let Some(gid) = info.gid {
            node.gid = gid;
        }
        if let Some(mtime) = info.modify_time {
            node.mtime = mtime;
        }
        Ok(())
    }

    async fn start_search(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> DriverResult<Box<dyn SearchContext>> {
        let state = self.lock();
        if !matches!(state.nodes.get(path).map(|n| &n.kind), Some(NodeKind::Directory)) {
            return Err(DriverError::NotADirectory);
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
        let entries: Vec<FileInfo> = state
            .nodes
            .iter()
            .filter(|(p, _)| {
                p.starts_with(&prefix)
                    && p.len() > prefix.len()
                    && !p[prefix.len()..].contains('/')
            })
            .map(|(p, node)| Self::info_for(p, node))
            .collect();
        Ok(Box::new(MemSearch { entries, pos: 0, closed: false }))
    }

    async fn disk_information(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
    ) -> DriverResult<Option<DiskSpace>> {
        Ok(self.disk)
    }

    fn supports_symlinks(&self) -> bool {
        self.symlinks
    }

    async fn read_symbolic_link(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
    ) -> DriverResult<String> {
        let state = self.lock();
        match state.nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(DriverError::InvalidOperation),
            None => Err(DriverError::NotFound),
        }
    }

    async fn create_symbolic_link(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        path: &str,
        target: &str,
        mode: Option<u32>,
    ) -> DriverResult<()> {
        if !self.symlinks {
            return Err(DriverError::NotSupported);
        }
        let mut state = self.lock();
        if state.nodes.contains_key(path) {
            return Err(DriverError::AlreadyExists);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            path.to_string(),
            MemNode {
                file_id: id,
                kind: NodeKind::Symlink(target.to_string()),
                mode,
                uid: 0,
                gid: 0,
                mtime: FileTimeMs(BASE_TIME_MS),
                flags: 0,
            },
        );
        Self::touch_parent(&mut state, path);
        Ok(())
    }

    fn supports_file_id_lookup(&self) -> bool {
        self.file_id_lookup
    }

    async fn build_path_for_file_id(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        _dir_id: u32,
        file_id: u32,
    ) -> DriverResult<String> {
        let state = self.lock();
        state
            .nodes
            .iter()
            .find(|(_, node)| node.file_id == file_id)
            .map(|(path, _)| path.clone())
            .ok_or(DriverError::NotFound)
    }
}

/// A parsed reply: the RPC acceptance body, the NFS status, and a
/// cursor over the remaining result fields.
pub struct Reply {
    pub body: accept_body,
    pub status: nfs3::nfsstat3,
    pub cursor: Cursor<Vec<u8>>,
}

impl Reply {
    /// Deserializes the next result field.
    pub fn take<T: Deserialize + Default>(&mut self) -> T {
        deserialize(&mut self.cursor).expect("reply field")
    }
}

/// Dispatcher harness: one share, one session, one packet pool.
pub struct Fixture {
    pub driver: Arc<MemDriver>,
    pub shares: ShareRegistry,
    pub share: Arc<Share>,
    pub session: Session,
    pub pool: PacketPool,
    xid: AtomicU32,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_driver(MemDriver::new(), true)
    }

    pub fn read_only() -> Self {
        Self::with_driver(MemDriver::new(), false)
    }

    pub fn with_driver(driver: MemDriver, writable: bool) -> Self {
        let driver = Arc::new(driver);
        let shares = ShareRegistry::new();
        let share = shares.register(Share::new("data", driver.clone(), writable));
        Self {
            driver,
            shares,
            share,
            session: Session::new(1, "127.0.0.1:1042"),
            pool: PacketPool::default(),
            xid: AtomicU32::new(100),
        }
    }

    pub fn share_handle(&self) -> nfs3::nfs_fh3 {
        handle::pack_share_handle(self.share.id())
    }

    /// Encodes `args`, dispatches the call, and parses the reply
    /// through the status word.
    pub async fn call(&self, proc: nfs3::NFSProcedure, args: &impl Serialize) -> Reply {
        let raw = self.call_raw(proc, args).await;
        let mut cursor = Cursor::new(raw);
        let msg = deserialize::<reply_msg>(&mut cursor).expect("rpc reply header");
        let status = if matches!(msg.body, accept_body::SUCCESS) {
            deserialize_status(&mut cursor)
        } else {
            nfs3::nfsstat3::NFS3ERR_SERVERFAULT
        };
        Reply { body: msg.body, status, cursor }
    }

    /// Dispatches and returns the raw reply bytes.
    pub async fn call_raw(&self, proc: nfs3::NFSProcedure, args: &impl Serialize) -> Vec<u8> {
        self.dispatch_raw(nfs3::VERSION, proc as u32, args).await
    }

    /// Dispatches with explicit version and procedure numbers, for the
    /// mismatch paths.
    pub async fn dispatch_raw(&self, vers: u32, proc: u32, args: &impl Serialize) -> Vec<u8> {
        let mut params = Vec::new();
        args.serialize(&mut params).expect("serialize args");
        let request = RpcPacket::from_params(params);
        let call = call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers,
            proc,
            ..Default::default()
        };
        let xid = self.xid.fetch_add(1, Ordering::Relaxed);
        let reply =
            process_request(xid, &call, &request, &self.session, &self.shares, &self.pool)
                .await
                .expect("process_request");
        reply.into_vec()
    }

    /// LOOKUP returning the minted handle, failing the test on error.
    pub async fn lookup(&self, dir: &nfs3::nfs_fh3, name: &str) -> nfs3::nfs_fh3 {
        let mut reply = self.try_lookup(dir, name).await;
        assert_eq!(reply.status, nfs3::nfsstat3::NFS3_OK, "lookup {name}");
        reply.take::<nfs3::nfs_fh3>()
    }

    pub async fn try_lookup(&self, dir: &nfs3::nfs_fh3, name: &str) -> Reply {
        let args = nfs3::diropargs3 { dir: dir.clone(), name: name.into() };
        self.call(nfs3::NFSProcedure::NFSPROC3_LOOKUP, &args).await
    }

    /// GETATTR returning the attributes, failing the test on error.
    pub async fn getattr(&self, fh: &nfs3::nfs_fh3) -> nfs3::fattr3 {
        let mut reply = self.call(nfs3::NFSProcedure::NFSPROC3_GETATTR, fh).await;
        assert_eq!(reply.status, nfs3::nfsstat3::NFS3_OK, "getattr");
        reply.take::<nfs3::fattr3>()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn deserialize_status(cursor: &mut Cursor<Vec<u8>>) -> nfs3::nfsstat3 {
    deserialize::<nfs3::nfsstat3>(cursor).expect("nfs status")
}
