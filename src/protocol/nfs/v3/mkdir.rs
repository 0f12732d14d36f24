//! MKDIR procedure (RFC 1813 section 3.3.9). An existing entry of any
//! kind under the requested name answers `NFS3ERR_EXIST`.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::{FileExistsStatus, OpenParams};
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::{self, HandleKind};
use crate::protocol::nfs::v3::common::{join_child, require_writable, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::dir::MKDIR3args;
use crate::protocol::xdr::nfs3::{nfsstat3, post_op_attr, post_op_fh3, set_mode3, wcc_data};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

const MKDIR_REPLY_SIZE: usize = 512;

pub async fn nfsproc3_mkdir(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<MKDIR3args>(input)?;
    debug!(xid, ?args.dirops, "nfsproc3_mkdir");

    match make_directory(&args, session, shares).await {
        Ok((obj, obj_attributes, dir_wcc)) => {
            reply.grow(pool, MKDIR_REPLY_SIZE);
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            obj.serialize(reply)?;
            obj_attributes.serialize(reply)?;
            dir_wcc.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, name = %args.dirops.name, %err, "mkdir failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn make_directory(
    args: &MKDIR3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<(post_op_fh3, post_op_attr, wcc_data), NfsError> {
    let resolved = resolve_handle(&args.dirops.dir, session, shares).await?;
    if resolved.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }
    require_writable(&resolved.tree)?;

    let driver = resolved.driver();
    let child_path = join_child(&resolved.path, &args.dirops.name)?;

    let dir_pre = driver.file_information(session, &resolved.tree, &resolved.path).await?;

    if driver.file_exists(session, &resolved.tree, &child_path).await != FileExistsStatus::NotExist
    {
        return Err(NfsError::Exist);
    }

    let mode = match args.attributes.mode {
        set_mode3::mode(m) => Some(m),
        set_mode3::Void => None,
    };
    driver
        .create_directory(session, &resolved.tree, &OpenParams::create(child_path.clone(), mode))
        .await?;

    let share = resolved.share();
    let obj_info = driver.file_information(session, &resolved.tree, &child_path).await.ok();
    let obj = match &obj_info {
        Some(info) => {
            share.file_ids().add_path(info.file_id, &child_path);
            post_op_fh3::handle(handle::pack_directory_handle(share.id(), info.file_id))
        }
        None => post_op_fh3::Void,
    };
    let dir_post = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();

    let fsid = resolved.fsid();
    Ok((
        obj,
        attr::post_op(obj_info.as_ref(), fsid),
        attr::wcc(Some(&dir_pre), dir_post.as_ref(), fsid),
    ))
}
