//! RENAME procedure (RFC 1813 section 3.3.14).
//!
//! Renames stay within one share. An existing regular file at the
//! destination is deleted first; any open file on the source is closed
//! and evicted before the driver renames, so the session never holds
//! an open file under a path that no longer exists. Afterwards the
//! file-id cache remaps the source's id onto the new path and records
//! the id the driver now reports there. When source and destination
//! directories are the same, the pre-operation snapshot is captured
//! once and reused for both WCC brackets.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::FileExistsStatus;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{
    evict_open_file, join_child, require_writable, resolve_handle,
};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{nfsstat3, wcc_data, RENAME3args};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

const RENAME_REPLY_SIZE: usize = 512;

pub async fn nfsproc3_rename(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<RENAME3args>(input)?;
    debug!(xid, from = %args.from.name, to = %args.to.name, "nfsproc3_rename");

    match rename(&args, session, shares).await {
        Ok((fromdir_wcc, todir_wcc)) => {
            reply.grow(pool, RENAME_REPLY_SIZE);
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            fromdir_wcc.serialize(reply)?;
            todir_wcc.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, from = %args.from.name, to = %args.to.name, %err, "rename failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn rename(
    args: &RENAME3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<(wcc_data, wcc_data), NfsError> {
    let from = resolve_handle(&args.from.dir, session, shares).await?;
    let to = resolve_handle(&args.to.dir, session, shares).await?;
    if from.kind == HandleKind::File || to.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }
    if from.share().id() != to.share().id() {
        return Err(NfsError::XDev);
    }
    require_writable(&from.tree)?;

    let driver = from.driver();
    let old_path = join_child(&from.path, &args.from.name)?;
    let new_path = join_child(&to.path, &args.to.name)?;
    let same_dir = from.path == to.path;

    let from_pre = driver.file_information(session, &from.tree, &from.path).await?;
    let to_pre = if same_dir {
        from_pre.clone()
    } else {
        driver.file_information(session, &to.tree, &to.path).await?
    };

    let source = driver.file_information(session, &from.tree, &old_path).await?;

    // An existing regular file at the destination is replaced.
    if driver.file_exists(session, &to.tree, &new_path).await == FileExistsStatus::FileExists {
        if let Ok(existing) = driver.file_information(session, &to.tree, &new_path).await {
            evict_open_file(session, existing.file_id).await;
            from.share().file_ids().delete_path(existing.file_id);
        }
        driver.delete_file(session, &to.tree, &new_path).await?;
    }

    evict_open_file(session, source.file_id).await;

    driver.rename_file(session, &from.tree, &old_path, &new_path).await?;

    let share = from.share();
    share.file_ids().add_path(source.file_id, &new_path);
    if let Ok(renamed) = driver.file_information(session, &to.tree, &new_path).await {
        share.file_ids().add_path(renamed.file_id, &new_path);
    }

    let fsid = from.fsid();
    let from_post = driver.file_information(session, &from.tree, &from.path).await.ok();
    let to_post = if same_dir {
        from_post.clone()
    } else {
        driver.file_information(session, &to.tree, &to.path).await.ok()
    };

    Ok((
        attr::wcc(Some(&from_pre), from_post.as_ref(), fsid),
        attr::wcc(Some(&to_pre), to_post.as_ref(), fsid),
    ))
}
