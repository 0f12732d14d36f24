//! FSSTAT procedure (RFC 1813 section 3.3.18): dynamic filesystem
//! usage. Drivers with a live usage interface answer from it; the rest
//! fall back to the share's static device context.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::fs::FSSTAT3resok;
use crate::protocol::xdr::nfs3::{nfs_fh3, nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_fsstat(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let fh = deserialize::<nfs_fh3>(input)?;
    debug!(xid, ?fh, "nfsproc3_fsstat");

    match filesystem_stat(&fh, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "fsstat failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn filesystem_stat(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<FSSTAT3resok, NfsError> {
    let resolved = resolve_handle(fh, session, shares).await?;
    let driver = resolved.driver();
    let info = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();

    let (total, free) = match driver.disk_information(session, &resolved.tree).await {
        Ok(Some(space)) => (space.total_bytes, space.free_bytes),
        _ => {
            let device = resolved.share().device();
            (device.total_bytes, device.free_bytes)
        }
    };

    Ok(FSSTAT3resok {
        obj_attributes: attr::post_op(info.as_ref(), resolved.fsid()),
        tbytes: total,
        fbytes: free,
        abytes: free,
        tfiles: 0,
        ffiles: 0,
        afiles: 0,
        invarsec: 0,
    })
}
