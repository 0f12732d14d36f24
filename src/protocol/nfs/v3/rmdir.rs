//! RMDIR procedure (RFC 1813 section 3.3.13): delete an empty
//! directory. A name that exists but is not a directory answers
//! `NFS3ERR_NOENT`; a non-empty directory answers `NFS3ERR_NOTEMPTY`.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::FileExistsStatus;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{join_child, require_writable, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{diropargs3, nfsstat3, wcc_data};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_rmdir(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<diropargs3>(input)?;
    debug!(xid, ?args, "nfsproc3_rmdir");

    match remove_directory(&args, session, shares).await {
        Ok(dir_wcc) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            dir_wcc.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, name = %args.name, %err, "rmdir failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn remove_directory(
    args: &diropargs3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<wcc_data, NfsError> {
    let resolved = resolve_handle(&args.dir, session, shares).await?;
    if resolved.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }
    require_writable(&resolved.tree)?;

    let driver = resolved.driver();
    let child_path = join_child(&resolved.path, &args.name)?;

    let dir_pre = driver.file_information(session, &resolved.tree, &resolved.path).await?;

    match driver.file_exists(session, &resolved.tree, &child_path).await {
        FileExistsStatus::DirectoryExists => {}
        FileExistsStatus::NotExist | FileExistsStatus::FileExists => {
            return Err(NfsError::NoEnt)
        }
    }

    let target = driver.file_information(session, &resolved.tree, &child_path).await.ok();

    driver.delete_directory(session, &resolved.tree, &child_path).await?;

    if let Some(target) = target {
        resolved.share().file_ids().delete_path(target.file_id);
    }

    let dir_post = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();
    Ok(attr::wcc(Some(&dir_pre), dir_post.as_ref(), resolved.fsid()))
}
