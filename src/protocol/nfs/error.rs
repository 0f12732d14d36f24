//! The engine's error taxonomy and its mapping onto wire status codes.
//!
//! Driver failures are caught at the procedure-handler boundary,
//! translated into an [`NfsError`] kind, and encoded exactly once when
//! the error reply is framed. Nothing is retried inside the engine.

use std::fmt;

use crate::cache::SlotTableFull;
use crate::driver::DriverError;
use crate::protocol::xdr::nfs3::nfsstat3;

/// Failure kinds a procedure can answer with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NfsError {
    /// The handle failed structural validation.
    BadHandle,
    /// A well-formed handle that no longer resolves to an object.
    Stale,
    /// The caller may not perform the operation.
    Access,
    /// Mutation attempted through a read-only filesystem.
    ReadOnly,
    /// The named object does not exist.
    NoEnt,
    /// The name already exists.
    Exist,
    /// A non-directory where a directory was required.
    NotDir,
    /// A directory where a non-directory was required.
    IsDir,
    /// Directory removal on a non-empty directory.
    NotEmpty,
    /// Rename across shares.
    XDev,
    /// The backing store is out of space.
    NoSpc,
    /// Quota exhausted.
    DQuot,
    /// File would grow past the server's limit.
    FBig,
    /// Invalid argument for the operation.
    InVal,
    /// The operation is not supported here.
    NotSupp,
    /// A directory cookie that no longer matches the directory.
    BadCookie,
    /// Internal server failure.
    ServerFault,
    /// Hard I/O failure.
    Io,
}

impl NfsError {
    /// Wire status code for this error kind.
    pub fn status(self) -> nfsstat3 {
        match self {
            NfsError::BadHandle => nfsstat3::NFS3ERR_BADHANDLE,
            NfsError::Stale => nfsstat3::NFS3ERR_STALE,
            NfsError::Access => nfsstat3::NFS3ERR_ACCES,
            NfsError::ReadOnly => nfsstat3::NFS3ERR_ROFS,
            NfsError::NoEnt => nfsstat3::NFS3ERR_NOENT,
            NfsError::Exist => nfsstat3::NFS3ERR_EXIST,
            NfsError::NotDir => nfsstat3::NFS3ERR_NOTDIR,
            NfsError::IsDir => nfsstat3::NFS3ERR_ISDIR,
            NfsError::NotEmpty => nfsstat3::NFS3ERR_NOTEMPTY,
            NfsError::XDev => nfsstat3::NFS3ERR_XDEV,
            NfsError::NoSpc => nfsstat3::NFS3ERR_NOSPC,
            NfsError::DQuot => nfsstat3::NFS3ERR_DQUOT,
            NfsError::FBig => nfsstat3::NFS3ERR_FBIG,
            NfsError::InVal => nfsstat3::NFS3ERR_INVAL,
            NfsError::NotSupp => nfsstat3::NFS3ERR_NOTSUPP,
            NfsError::BadCookie => nfsstat3::NFS3ERR_BAD_COOKIE,
            NfsError::ServerFault => nfsstat3::NFS3ERR_SERVERFAULT,
            NfsError::Io => nfsstat3::NFS3ERR_IO,
        }
    }
}

impl fmt::Display for NfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.status())
    }
}

impl std::error::Error for NfsError {}

impl From<DriverError> for NfsError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotFound => NfsError::NoEnt,
            DriverError::AccessDenied => NfsError::Access,
            DriverError::AlreadyExists => NfsError::Exist,
            DriverError::IsADirectory => NfsError::IsDir,
            DriverError::NotADirectory => NfsError::NotDir,
            DriverError::DirectoryNotEmpty => NfsError::NotEmpty,
            DriverError::DiskFull => NfsError::NoSpc,
            DriverError::QuotaExceeded => NfsError::DQuot,
            DriverError::FileTooLarge => NfsError::FBig,
            DriverError::InvalidOperation => NfsError::InVal,
            DriverError::NotSupported => NfsError::NotSupp,
            DriverError::Io(_) => NfsError::Io,
        }
    }
}

impl From<SlotTableFull> for NfsError {
    fn from(_: SlotTableFull) -> Self {
        NfsError::ServerFault
    }
}
