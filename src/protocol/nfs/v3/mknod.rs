//! MKNOD procedure (RFC 1813 section 3.3.11). Special files are not
//! representable through the driver contract, so every call answers
//! `NFS3ERR_NOTSUPP`. Only the directory arguments are read; the rest
//! of the request is left unparsed.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{diropargs3, nfsstat3, wcc_data};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_mknod(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    _session: &Session,
    _shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<diropargs3>(input)?;
    debug!(xid, ?args, "nfsproc3_mknod");
    warn!(xid, name = %args.name, "mknod is not supported");

    let status = nfsstat3::NFS3ERR_NOTSUPP;
    make_success_reply(xid).serialize(reply)?;
    status.serialize(reply)?;
    wcc_data::default().serialize(reply)?;
    Ok(status)
}
