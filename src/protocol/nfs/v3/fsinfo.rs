//! FSINFO procedure (RFC 1813 section 3.3.19): static server
//! capabilities. The advertised time resolution is one millisecond,
//! matching the precision file times are kept at internally; the
//! symlink property bit follows the driver's capability.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::nfs::v3::{
    IO_SIZE_MULTIPLE, MAX_READ_SIZE, MAX_WRITE_SIZE, PREFERRED_DIR_SIZE, PREFERRED_IO_SIZE,
};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::fs::{FSF_CANSETTIME, FSF_HOMOGENEOUS, FSF_SYMLINK, FSINFO3resok};
use crate::protocol::xdr::nfs3::{nfs_fh3, nfsstat3, nfstime3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

/// Largest file size advertised to clients.
const MAX_FILE_SIZE: u64 = 0x7FFF_FFFF_FFFF_FFFF;

pub async fn nfsproc3_fsinfo(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let fh = deserialize::<nfs_fh3>(input)?;
    debug!(xid, ?fh, "nfsproc3_fsinfo");

    match filesystem_info(&fh, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "fsinfo failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn filesystem_info(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<FSINFO3resok, NfsError> {
    let resolved = resolve_handle(fh, session, shares).await?;
    let driver = resolved.driver();
    let info = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();

    let mut properties = FSF_HOMOGENEOUS | FSF_CANSETTIME;
    if driver.supports_symlinks() {
        properties |= FSF_SYMLINK;
    }

    Ok(FSINFO3resok {
        obj_attributes: attr::post_op(info.as_ref(), resolved.fsid()),
        rtmax: MAX_READ_SIZE,
        rtpref: PREFERRED_IO_SIZE,
        rtmult: IO_SIZE_MULTIPLE,
        wtmax: MAX_WRITE_SIZE,
        wtpref: PREFERRED_IO_SIZE,
        wtmult: IO_SIZE_MULTIPLE,
        dtpref: PREFERRED_DIR_SIZE,
        maxfilesize: MAX_FILE_SIZE,
        time_delta: nfstime3 { seconds: 0, nseconds: 1_000_000 },
        properties,
    })
}
