//! LINK procedure (RFC 1813 section 3.3.15). Hard links are not
//! exposed through the driver contract; every call is denied with
//! `NFS3ERR_ACCES`.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::file::LINK3args;
use crate::protocol::xdr::nfs3::{nfsstat3, post_op_attr, wcc_data};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_link(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    _session: &Session,
    _shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<LINK3args>(input)?;
    debug!(xid, ?args.link, "nfsproc3_link");
    warn!(xid, "hard links are denied");

    let status = nfsstat3::NFS3ERR_ACCES;
    make_success_reply(xid).serialize(reply)?;
    status.serialize(reply)?;
    post_op_attr::Void.serialize(reply)?;
    wcc_data::default().serialize(reply)?;
    Ok(status)
}
