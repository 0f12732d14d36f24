//! Attribute encoding: driver [`FileInfo`] into the RFC 1813 attribute
//! structures.
//!
//! The driver is allowed to be sparse about metadata, so this is where
//! the engine's defaults live: directories report mode `0o040755` and a
//! size of 512, regular files without a driver-supplied mode report
//! `0o100777`, link counts are always 1, and wire file ids are offset
//! by [`FILE_ID_OFFSET`] to keep ids 0 and 1 (which some clients treat
//! specially) off the wire.

use crate::driver::{FileInfo, FileTimeMs, FileType};
use crate::protocol::xdr::nfs3::{
    fattr3, fileid3, ftype3, nfstime3, post_op_attr, pre_op_attr, specdata3, wcc_attr, wcc_data,
};

/// Added to every driver file id before it goes on the wire.
pub const FILE_ID_OFFSET: u64 = 2;

const DEFAULT_DIR_MODE: u32 = 0o040755;
const DEFAULT_FILE_MODE: u32 = 0o100777;
const DEFAULT_LINK_MODE: u32 = 0o120777;
const DIR_REPORTED_SIZE: u64 = 512;

/// Wire file id for a driver file id.
pub fn wire_file_id(file_id: u32) -> fileid3 {
    u64::from(file_id) + FILE_ID_OFFSET
}

fn ftype_of(file_type: FileType) -> ftype3 {
    match file_type {
        FileType::Regular => ftype3::NF3REG,
        FileType::Directory => ftype3::NF3DIR,
        FileType::SymbolicLink => ftype3::NF3LNK,
        FileType::Block => ftype3::NF3BLK,
        FileType::Character => ftype3::NF3CHR,
        FileType::Socket => ftype3::NF3SOCK,
        FileType::Fifo => ftype3::NF3FIFO,
    }
}

fn wire_time(time: FileTimeMs) -> nfstime3 {
    nfstime3 { seconds: time.seconds(), nseconds: 0 }
}

fn mode_of(info: &FileInfo) -> u32 {
    info.mode.unwrap_or(match info.file_type {
        FileType::Directory => DEFAULT_DIR_MODE,
        FileType::SymbolicLink => DEFAULT_LINK_MODE,
        _ => DEFAULT_FILE_MODE,
    })
}

/// Full `fattr3` for one object. `fsid` identifies the share the
/// object lives on.
pub fn file_attributes(info: &FileInfo, fsid: u64) -> fattr3 {
    let size = if info.is_directory() { DIR_REPORTED_SIZE } else { info.size };
    let used = if info.alloc_size > 0 { info.alloc_size } else { info.size };
    fattr3 {
        ftype: ftype_of(info.file_type),
        mode: mode_of(info),
        nlink: 1,
        uid: info.uid,
        gid: info.gid,
        size,
        used,
        rdev: specdata3::default(),
        fsid,
        fileid: wire_file_id(info.file_id),
        atime: wire_time(info.access_time),
        mtime: wire_time(info.modify_time),
        ctime: wire_time(info.change_time),
    }
}

/// Optional post-operation attributes.
pub fn post_op(info: Option<&FileInfo>, fsid: u64) -> post_op_attr {
    match info {
        Some(info) => post_op_attr::attributes(file_attributes(info, fsid)),
        None => post_op_attr::Void,
    }
}

/// The weak-cache-consistency subset of an object's attributes.
pub fn wcc_attributes(info: &FileInfo) -> wcc_attr {
    let size = if info.is_directory() { DIR_REPORTED_SIZE } else { info.size };
    wcc_attr { size, mtime: wire_time(info.modify_time), ctime: wire_time(info.change_time) }
}

/// Optional pre-operation attributes.
pub fn pre_op(info: Option<&FileInfo>) -> pre_op_attr {
    match info {
        Some(info) => pre_op_attr::attributes(wcc_attributes(info)),
        None => pre_op_attr::Void,
    }
}

/// WCC bracket from snapshots taken before and after a mutation.
pub fn wcc(pre: Option<&FileInfo>, post: Option<&FileInfo>, fsid: u64) -> wcc_data {
    wcc_data { before: pre_op(pre), after: post_op(post, fsid) }
}
