//! PATHCONF procedure (RFC 1813 section 3.3.20): POSIX pathname
//! limits. Names are case-insensitive but case-preserving, matching
//! the share semantics the drivers implement.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::v3::common::{resolve_handle, MAX_NAME_LEN};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::fs::PATHCONF3resok;
use crate::protocol::xdr::nfs3::{nfs_fh3, nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

const LINK_MAX: u32 = 32767;

pub async fn nfsproc3_pathconf(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let fh = deserialize::<nfs_fh3>(input)?;
    debug!(xid, ?fh, "nfsproc3_pathconf");

    match path_configuration(&fh, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "pathconf failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn path_configuration(
    fh: &nfs_fh3,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<PATHCONF3resok, NfsError> {
    let resolved = resolve_handle(fh, session, shares).await?;
    let info = resolved
        .driver()
        .file_information(session, &resolved.tree, &resolved.path)
        .await
        .ok();

    Ok(PATHCONF3resok {
        obj_attributes: attr::post_op(info.as_ref(), resolved.fsid()),
        linkmax: LINK_MAX,
        name_max: MAX_NAME_LEN as u32,
        no_trunc: true,
        chown_restricted: true,
        case_insensitive: true,
        case_preserving: true,
    })
}
