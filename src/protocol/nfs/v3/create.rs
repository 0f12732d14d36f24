//! CREATE procedure (RFC 1813 section 3.3.8): create a regular file.
//!
//! An existing regular file answers `NFS3ERR_EXIST` and an existing
//! directory `NFS3ERR_ISDIR`, for every creation mode; the exclusive
//! mode's verifier is parsed but not persisted. The freshly created
//! file stays open in the session's file cache, since a CREATE is
//! almost always followed by WRITEs, and its id/path pair primes the
//! share's file-id cache.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::{FileExistsStatus, OpenParams};
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::{self, HandleKind};
use crate::protocol::nfs::v3::common::{join_child, require_writable, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::file::{createhow3, CREATE3args};
use crate::protocol::xdr::nfs3::{
    nfsstat3, post_op_attr, post_op_fh3, set_mode3, wcc_data,
};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

/// Floor for the reply allocation: handle, attributes, wcc.
const CREATE_REPLY_SIZE: usize = 512;

struct CreateReply {
    obj: post_op_fh3,
    obj_attributes: post_op_attr,
    dir_wcc: wcc_data,
}

pub async fn nfsproc3_create(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<CREATE3args>(input)?;
    debug!(xid, ?args.dirops, "nfsproc3_create");

    match create(&args, session, shares).await {
        Ok(res) => {
            reply.grow(pool, CREATE_REPLY_SIZE);
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.obj.serialize(reply)?;
            res.obj_attributes.serialize(reply)?;
            res.dir_wcc.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, name = %args.dirops.name, %err, "create failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn create(
    args: &CREATE3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<CreateReply, NfsError> {
    let resolved = resolve_handle(&args.dirops.dir, session, shares).await?;
    if resolved.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }
    require_writable(&resolved.tree)?;

    let driver = resolved.driver();
    let child_path = join_child(&resolved.path, &args.dirops.name)?;

    let dir_pre = driver.file_information(session, &resolved.tree, &resolved.path).await?;

    match driver.file_exists(session, &resolved.tree, &child_path).await {
        FileExistsStatus::FileExists => return Err(NfsError::Exist),
        FileExistsStatus::DirectoryExists => return Err(NfsError::IsDir),
        FileExistsStatus::NotExist => {}
    }

    let mode = match &args.how {
        createhow3::UNCHECKED(attrs) | createhow3::GUARDED(attrs) => match attrs.mode {
            set_mode3::mode(m) => Some(m),
            set_mode3::Void => None,
        },
        createhow3::EXCLUSIVE(_) => None,
    };

    let file = driver
        .create_file(session, &resolved.tree, &OpenParams::create(child_path.clone(), mode))
        .await?;
    let file_id = file.file_id;

    let share = resolved.share();
    share.file_ids().add_path(file_id, &child_path);
    session.file_cache().add(file, resolved.tree.clone());

    let obj_info = driver.file_information(session, &resolved.tree, &child_path).await.ok();
    let dir_post = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();

    let fsid = resolved.fsid();
    Ok(CreateReply {
        obj: post_op_fh3::handle(handle::pack_file_handle(share.id(), dir_pre.file_id, file_id)),
        obj_attributes: attr::post_op(obj_info.as_ref(), fsid),
        dir_wcc: attr::wcc(Some(&dir_pre), dir_post.as_ref(), fsid),
    })
}
