//! LOOKUP procedure (RFC 1813 section 3.3.3): translate a name within
//! a directory into a file handle.
//!
//! This is where file handles are minted for existing objects, so the
//! handler also primes the share's file-id cache with the id/path pair
//! it just resolved; every later operation on the returned handle
//! resolves through that entry.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::{self, HandleKind};
use crate::protocol::nfs::v3::common::{join_child, parent_of, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{diropargs3, nfs_fh3, nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

struct LookupReply {
    object: nfs_fh3,
    obj_attributes: post_op_attr,
    dir_attributes: post_op_attr,
}

pub async fn nfsproc3_lookup(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<diropargs3>(input)?;
    debug!(xid, ?args, "nfsproc3_lookup");

    match lookup(&args, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.object.serialize(reply)?;
            res.obj_attributes.serialize(reply)?;
            res.dir_attributes.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, name = %args.name, %err, "lookup failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn lookup(
    args: &diropargs3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<LookupReply, NfsError> {
    let resolved = resolve_handle(&args.dir, session, shares).await?;
    if resolved.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }

    let driver = resolved.driver();
    let dir_info = driver
        .file_information(session, &resolved.tree, &resolved.path)
        .await
        .map_err(|_| NfsError::Stale)?;

    let child_path = match args.name.as_bytes() {
        b"." => resolved.path.clone(),
        b".." => parent_of(&resolved.path).to_string(),
        _ => join_child(&resolved.path, &args.name)?,
    };

    let child = driver.file_information(session, &resolved.tree, &child_path).await?;

    let share = resolved.share();
    share.file_ids().add_path(child.file_id, &child_path);

    let object = if child.is_directory() {
        handle::pack_directory_handle(share.id(), child.file_id)
    } else {
        handle::pack_file_handle(share.id(), dir_info.file_id, child.file_id)
    };

    let fsid = resolved.fsid();
    Ok(LookupReply {
        object,
        obj_attributes: attr::post_op(Some(&child), fsid),
        dir_attributes: attr::post_op(Some(&dir_info), fsid),
    })
}
