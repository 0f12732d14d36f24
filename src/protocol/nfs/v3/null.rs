//! NULL procedure (RFC 1813 section 3.3.0): do nothing. Clients use it
//! to probe liveness and measure round trips.

use tracing::debug;

use crate::protocol::rpc::ReplyPacket;
use crate::protocol::xdr::nfs3::nfsstat3;
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::Serialize;

pub fn nfsproc3_null(xid: u32, reply: &mut ReplyPacket) -> anyhow::Result<nfsstat3> {
    debug!(xid, "nfsproc3_null");
    make_success_reply(xid).serialize(reply)?;
    Ok(nfsstat3::NFS3_OK)
}
