//! READLINK procedure (RFC 1813 section 3.3.5): read the target of a
//! symbolic link. Only served when the driver implements the symbolic
//! link interface; objects of any other type answer `NFS3ERR_INVAL`.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::FileType;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{nfs_fh3, nfspath3, nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

/// Floor for the reply allocation; link targets are paths.
const READLINK_REPLY_SIZE: usize = 4096;

pub async fn nfsproc3_readlink(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let fh = deserialize::<nfs_fh3>(input)?;
    debug!(xid, ?fh, "nfsproc3_readlink");

    match read_link(&fh, session, shares).await {
        Ok((symlink_attributes, target)) => {
            reply.grow(pool, READLINK_REPLY_SIZE + target.len());
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            symlink_attributes.serialize(reply)?;
            target.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "readlink failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn read_link(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<(post_op_attr, nfspath3), NfsError> {
    let resolved = resolve_handle(fh, session, shares).await?;
    let driver = resolved.driver();
    if !driver.supports_symlinks() {
        return Err(NfsError::NotSupp);
    }

    let info = driver.file_information(session, &resolved.tree, &resolved.path).await?;
    if info.file_type != FileType::SymbolicLink {
        return Err(NfsError::InVal);
    }

    let target = driver.read_symbolic_link(session, &resolved.tree, &resolved.path).await?;
    Ok((attr::post_op(Some(&info), resolved.fsid()), target.as_str().into()))
}
