//! COMMIT procedure (RFC 1813 section 3.3.21). Writes here are
//! performed through to the driver, so COMMIT has nothing left to
//! flush; it brackets the current attributes and echoes the instance
//! write verifier so clients can detect a restart since their WRITEs.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::file::{COMMIT3args, COMMIT3resok};
use crate::protocol::xdr::nfs3::{nfsstat3, wcc_data};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_commit(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<COMMIT3args>(input)?;
    debug!(xid, offset = args.offset, count = args.count, "nfsproc3_commit");

    match commit(&args, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "commit failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn commit(
    args: &COMMIT3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<COMMIT3resok, NfsError> {
    let resolved = resolve_handle(&args.file, session, shares).await?;
    let info = resolved
        .driver()
        .file_information(session, &resolved.tree, &resolved.path)
        .await
        .ok();

    Ok(COMMIT3resok {
        file_wcc: attr::wcc(info.as_ref(), info.as_ref(), resolved.fsid()),
        verf: shares.write_verifier(),
    })
}
