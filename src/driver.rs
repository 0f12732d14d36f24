//! The filesystem driver contract consumed by the request-processing
//! engine.
//!
//! The engine never touches storage itself: every share is backed by an
//! implementation of [`DiskDriver`], which performs the actual I/O and
//! reports metadata through [`FileInfo`]. Open files are represented by
//! [`NetworkFile`] objects owned by the per-session open-file cache, and
//! directory enumeration hands back a [`SearchContext`] iterator that
//! supports restarting, which is what makes READDIR cookie resumption
//! possible.
//!
//! Optional capabilities (symbolic links, file-id lookup, disk usage
//! reporting) have default method implementations so simple drivers stay
//! small; the engine probes them through the `supports_*` methods before
//! relying on the operations.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::session::{Session, TreeConnection};

/// Result of driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Failures a driver can report. Procedure handlers translate these to
/// NFS status codes at the reply boundary; the engine never retries.
#[derive(Debug)]
pub enum DriverError {
    /// The path does not exist.
    NotFound,
    /// The caller may not perform the operation on this object.
    AccessDenied,
    /// The path already exists.
    AlreadyExists,
    /// A directory was given where a file was required.
    IsADirectory,
    /// A file was given where a directory was required.
    NotADirectory,
    /// Directory removal on a non-empty directory.
    DirectoryNotEmpty,
    /// The backing store is out of space.
    DiskFull,
    /// The caller's quota is exhausted.
    QuotaExceeded,
    /// The operation would grow a file past the driver's limit.
    FileTooLarge,
    /// The arguments are not valid for this operation.
    InvalidOperation,
    /// The driver does not implement this optional operation.
    NotSupported,
    /// An underlying I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotFound => write!(f, "no such file or directory"),
            DriverError::AccessDenied => write!(f, "access denied"),
            DriverError::AlreadyExists => write!(f, "file exists"),
            DriverError::IsADirectory => write!(f, "is a directory"),
            DriverError::NotADirectory => write!(f, "not a directory"),
            DriverError::DirectoryNotEmpty => write!(f, "directory not empty"),
            DriverError::DiskFull => write!(f, "no space left on device"),
            DriverError::QuotaExceeded => write!(f, "quota exceeded"),
            DriverError::FileTooLarge => write!(f, "file too large"),
            DriverError::InvalidOperation => write!(f, "invalid operation"),
            DriverError::NotSupported => write!(f, "operation not supported"),
            DriverError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err)
    }
}

/// A point in time with millisecond precision, the resolution file
/// times are kept at internally. The wire carries whole seconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTimeMs(pub u64);

impl FileTimeMs {
    /// The current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(elapsed.as_millis() as u64)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn seconds(self) -> u32 {
        (self.0 / 1000) as u32
    }

    pub fn from_seconds(seconds: u32) -> Self {
        Self(u64::from(seconds) * 1000)
    }
}

/// Type of a filesystem object as the driver reports it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FileType {
    #[default]
    Regular,
    Directory,
    SymbolicLink,
    Block,
    Character,
    Socket,
    Fifo,
}

/// The object is not writable; Access drops the mutation bits for it.
pub const FILE_FLAG_READ_ONLY: u32 = 0x0001;
/// The object should be hidden from casual listings.
pub const FILE_FLAG_HIDDEN: u32 = 0x0002;

/// Metadata for one filesystem object.
#[derive(Clone, Debug, Default)]
pub struct FileInfo {
    /// Name of the object, without any directory components.
    pub name: String,
    /// Driver-assigned identifier, unique within the share.
    pub file_id: u32,
    /// Size in bytes.
    pub size: u64,
    /// Bytes allocated on the backing store; zero when unknown.
    pub alloc_size: u64,
    /// Unix mode bits when the driver tracks them.
    pub mode: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub access_time: FileTimeMs,
    pub modify_time: FileTimeMs,
    pub change_time: FileTimeMs,
    pub create_time: FileTimeMs,
    pub file_type: FileType,
    /// `FILE_FLAG_*` bits.
    pub flags: u32,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & FILE_FLAG_READ_ONLY != 0
    }
}

/// Access granted to an open file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileAccess {
    ReadOnly,
    ReadWrite,
}

impl FileAccess {
    /// Whether a grant of `self` satisfies a request for `wanted`.
    pub fn covers(self, wanted: FileAccess) -> bool {
        match wanted {
            FileAccess::ReadOnly => true,
            FileAccess::ReadWrite => self == FileAccess::ReadWrite,
        }
    }
}

/// An open file as tracked by the per-session cache. Drivers key any
/// real resources (descriptors, blobs) off `file_id` or `path`
/// internally; the engine serializes I/O per `NetworkFile` by holding
/// its monitor across driver calls.
#[derive(Debug)]
pub struct NetworkFile {
    /// Driver file id, also the open-file cache key.
    pub file_id: u32,
    /// Share-relative path the file was opened under.
    pub path: String,
    /// Access the driver granted at open time.
    pub access: FileAccess,
    /// Current size; maintained across writes and truncation.
    pub size: u64,
    /// Cleared once the file has been handed back to the driver.
    pub open: bool,
}

impl NetworkFile {
    pub fn new(file_id: u32, path: impl Into<String>, access: FileAccess, size: u64) -> Self {
        Self { file_id, path: path.into(), access, size, open: true }
    }
}

/// Parameters for opening or creating a file.
#[derive(Clone, Debug)]
pub struct OpenParams {
    /// Share-relative path of the target.
    pub path: String,
    /// Access requested by the engine.
    pub access: FileAccess,
    /// Truncate to zero length on open.
    pub truncate: bool,
    /// Mode bits for newly created objects.
    pub mode: Option<u32>,
}

impl OpenParams {
    pub fn open(path: impl Into<String>, access: FileAccess) -> Self {
        Self { path: path.into(), access, truncate: false, mode: None }
    }

    pub fn create(path: impl Into<String>, mode: Option<u32>) -> Self {
        Self { path: path.into(), access: FileAccess::ReadWrite, truncate: false, mode }
    }
}

/// What a path refers to, if anything.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileExistsStatus {
    NotExist,
    FileExists,
    DirectoryExists,
}

/// Attribute changes requested through SETATTR, minus size changes,
/// which go through [`DiskDriver::truncate_file`] on an open file.
#[derive(Clone, Debug, Default)]
pub struct SetInfo {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub access_time: Option<FileTimeMs>,
    pub modify_time: Option<FileTimeMs>,
}

impl SetInfo {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.access_time.is_none()
            && self.modify_time.is_none()
    }
}

/// Dynamic disk usage reported by drivers that track it.
#[derive(Copy, Clone, Debug, Default)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// An in-progress directory enumeration.
///
/// Positions are expressed as resume ids: `resume_id` names the entry
/// the next [`next_file_info`](SearchContext::next_file_info) call will
/// return, and `restart_at(r)` repositions so that the entry with
/// resume id `r` is returned next. Resume ids must be stable for the
/// lifetime of the search and stay below the reserved dot-entry values
/// of the cookie space.
#[async_trait]
pub trait SearchContext: Send {
    /// Returns the next entry, or `None` at the end of the directory.
    async fn next_file_info(&mut self) -> Result<Option<FileInfo>>;

    /// Resume id of the entry the next call will return.
    fn resume_id(&self) -> u32;

    /// Repositions the enumeration at the entry with the given resume
    /// id.
    async fn restart_at(&mut self, resume_id: u32) -> Result<()>;

    /// Whether another entry is available.
    fn has_more_files(&self) -> bool;

    /// Releases driver resources held by the search.
    async fn close_search(&mut self);
}

/// A driver transaction attached to the session for the duration of one
/// request. The dispatcher ends it after every handler.
#[async_trait]
pub trait DriverTransaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>);
}

/// The filesystem driver behind a share.
///
/// Paths are share-relative, start with `/`, and name the share root as
/// `"/"`. Methods taking a [`NetworkFile`] are called with the file's
/// monitor held, so a driver may assume per-file serialization of
/// read/write/truncate sequences.
#[async_trait]
pub trait DiskDriver: Send + Sync {
    /// Returns metadata for the object at `path`.
    async fn file_information(
        &self,
        session: &Session,
        tree: &TreeConnection,
        path: &str,
    ) -> Result<FileInfo>;

    /// Reports whether `path` names a file, a directory, or nothing.
    async fn file_exists(
        &self,
        session: &Session,
        tree: &TreeConnection,
        path: &str,
    ) -> FileExistsStatus;

    /// Opens an existing file.
    async fn open_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> Result<NetworkFile>;

    /// Creates a new regular file and opens it.
    async fn create_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> Result<NetworkFile>;

    /// Creates a new directory.
    async fn create_directory(
        &self,
        session: &Session,
        tree: &TreeConnection,
        params: &OpenParams,
    ) -> Result<()>;

    /// Returns an open file to the driver, which clears its open flag.
    /// Called on cache eviction and session teardown.
    async fn close_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        file: &mut NetworkFile,
    ) -> Result<()>;

    /// Deletes a regular file.
    async fn delete_file(&self, session: &Session, tree: &TreeConnection, path: &str)
        -> Result<()>;

    /// Deletes an empty directory.
    async fn delete_directory(
        &self,
        session: &Session,
        tree: &TreeConnection,
        path: &str,
    ) -> Result<()>;

    /// Renames a file or directory within the share.
    async fn rename_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        old_path: &str,
        new_path: &str,
    ) -> Result<()>;

    /// Reads from an open file into `buf` at `offset`, returning the
    /// number of bytes read.
    async fn read_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<u32>;

    /// Writes to an open file at `offset`, returning the number of
    /// bytes written.
    async fn write_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        data: &[u8],
        offset: u64,
    ) -> Result<u32>;

    /// Sets the size of an open file.
    async fn truncate_file(
        &self,
        session: &Session,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        size: u64,
    ) -> Result<()>;

    /// Applies attribute changes to the object at `path`.
    async fn set_file_information(
        &self,
        session: &Session,
        tree: &TreeConnection,
        path: &str,
        info: &SetInfo,
    ) -> Result<()>;

    /// Begins enumerating the directory at `path`.
    async fn start_search(
        &self,
        session: &Session,
        tree: &TreeConnection,
        path: &str,
    ) -> Result<Box<dyn SearchContext>>;

    /// Dynamic disk usage, for drivers that track it. `None` routes
    /// FSSTAT to the share's static device context.
    async fn disk_information(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
    ) -> Result<Option<DiskSpace>> {
        Ok(None)
    }

    /// Whether the symbolic-link operations below are implemented.
    fn supports_symlinks(&self) -> bool {
        false
    }

    /// Reads the target of a symbolic link.
    async fn read_symbolic_link(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        _path: &str,
    ) -> Result<String> {
        Err(DriverError::NotSupported)
    }

    /// Creates a symbolic link at `path` pointing at `target`.
    async fn create_symbolic_link(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        _path: &str,
        _target: &str,
        _mode: Option<u32>,
    ) -> Result<()> {
        Err(DriverError::NotSupported)
    }

    /// Whether [`build_path_for_file_id`](Self::build_path_for_file_id)
    /// is implemented. Shares of drivers without it hand out `Stale`
    /// for handles that miss the file-id cache.
    fn supports_file_id_lookup(&self) -> bool {
        false
    }

    /// Rebuilds the share-relative path for a file id, consulting
    /// `dir_id` when it helps. Used to service cache misses.
    async fn build_path_for_file_id(
        &self,
        _session: &Session,
        _tree: &TreeConnection,
        _dir_id: u32,
        _file_id: u32,
    ) -> Result<String> {
        Err(DriverError::NotSupported)
    }
}
