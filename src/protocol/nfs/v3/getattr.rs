//! GETATTR procedure (RFC 1813 section 3.3.1): fetch the attributes of
//! the object a handle names.
//!
//! When the handle refers to a file the session still holds open, the
//! reported size comes from the open file rather than the driver's
//! metadata, so a client that just wrote sees its own size before the
//! driver has flushed.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{fattr3, nfs_fh3, nfsstat3};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_getattr(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let fh = deserialize::<nfs_fh3>(input)?;
    debug!(xid, ?fh, "nfsproc3_getattr");

    match get_attributes(&fh, session, shares).await {
        Ok(attributes) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            attributes.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "getattr failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn get_attributes(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<fattr3, NfsError> {
    let resolved = resolve_handle(fh, session, shares).await?;
    let mut info =
        resolved.driver().file_information(session, &resolved.tree, &resolved.path).await?;

    if resolved.kind == HandleKind::File {
        if let Some((file, _)) = session.file_cache().find(resolved.file_id) {
            info.size = file.lock().await.size;
        }
    }

    Ok(attr::file_attributes(&info, resolved.fsid()))
}
