//! The opaque file handle codec.
//!
//! Handles are a fixed 32 bytes the client must echo verbatim. The
//! layout, all big-endian:
//!
//! ```text
//! [0]      version byte
//! [1]      kind tag: 1 = share, 2 = directory, 3 = file
//! [2..6]   share id
//! [6..10]  directory id   (directory and file kinds)
//! [10..14] file id        (file kind)
//! [14..32] zero padding
//! ```
//!
//! Ids are driver file ids; [`ID_NONE`] marks an absent id. A handle
//! stays resolvable for the lifetime of the server instance as long as
//! the object it names exists and the file-id cache (or the driver's
//! file-id lookup) can still produce its path.

use num_traits::FromPrimitive;

use crate::protocol::xdr::nfs3::nfs_fh3;

/// Fixed size of every handle this server emits.
pub const HANDLE_SIZE: usize = 32;

/// Version byte stamped into byte 0.
const HANDLE_VERSION: u8 = 0x01;

/// Sentinel for an absent directory or file id (the on-wire `-1`).
pub const ID_NONE: u32 = u32::MAX;

/// What a handle refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_derive::FromPrimitive)]
#[repr(u8)]
pub enum HandleKind {
    Share = 1,
    Directory = 2,
    File = 3,
}

fn pack(kind: HandleKind, share_id: u32, dir_id: u32, file_id: u32) -> nfs_fh3 {
    let mut data = vec![0u8; HANDLE_SIZE];
    data[0] = HANDLE_VERSION;
    data[1] = kind as u8;
    data[2..6].copy_from_slice(&share_id.to_be_bytes());
    data[6..10].copy_from_slice(&dir_id.to_be_bytes());
    data[10..14].copy_from_slice(&file_id.to_be_bytes());
    nfs_fh3 { data }
}

/// Handle for a share root.
pub fn pack_share_handle(share_id: u32) -> nfs_fh3 {
    pack(HandleKind::Share, share_id, 0, ID_NONE)
}

/// Handle for a directory within a share.
pub fn pack_directory_handle(share_id: u32, dir_id: u32) -> nfs_fh3 {
    pack(HandleKind::Directory, share_id, dir_id, ID_NONE)
}

/// Handle for a file, carrying its containing directory when known.
pub fn pack_file_handle(share_id: u32, dir_id: u32, file_id: u32) -> nfs_fh3 {
    pack(HandleKind::File, share_id, dir_id, file_id)
}

/// Kind of the handle, or `None` for malformed bytes.
pub fn kind_of(handle: &nfs_fh3) -> Option<HandleKind> {
    if handle.data.len() != HANDLE_SIZE || handle.data[0] != HANDLE_VERSION {
        return None;
    }
    HandleKind::from_u8(handle.data[1])
}

/// Whether the handle has the expected size, version, and kind tag.
pub fn is_valid(handle: &nfs_fh3) -> bool {
    kind_of(handle).is_some()
}

fn field(handle: &nfs_fh3, range: std::ops::Range<usize>) -> u32 {
    u32::from_be_bytes(handle.data[range].try_into().expect("validated handle field"))
}

/// Share id of a validated handle.
pub fn unpack_share_id(handle: &nfs_fh3) -> u32 {
    field(handle, 2..6)
}

/// Directory id of a validated handle; 0 for share handles.
pub fn unpack_directory_id(handle: &nfs_fh3) -> u32 {
    field(handle, 6..10)
}

/// File id of a validated handle; [`ID_NONE`] for non-file handles.
pub fn unpack_file_id(handle: &nfs_fh3) -> u32 {
    field(handle, 10..14)
}
