//! ACCESS procedure (RFC 1813 section 3.3.4): report which of the
//! requested permission bits the server would actually honor.
//!
//! Share handles grant the full requested mask. For everything else the
//! mask is narrowed twice: a non-writable tree connection keeps only
//! read, lookup and execute; an object flagged read-only by the driver
//! additionally loses modify, extend and delete.

use std::io::Read;

use tracing::{debug, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::resolve_handle;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{
    nfsstat3, post_op_attr, ACCESS3args, ACCESS3_DELETE, ACCESS3_EXECUTE, ACCESS3_EXTEND,
    ACCESS3_LOOKUP, ACCESS3_MODIFY, ACCESS3_READ,
};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

const READ_ONLY_MASK: u32 = ACCESS3_READ | ACCESS3_LOOKUP | ACCESS3_EXECUTE;

pub async fn nfsproc3_access(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<ACCESS3args>(input)?;
    debug!(xid, ?args, "nfsproc3_access");

    match check_access(&args, session, shares).await {
        Ok((obj_attributes, granted)) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            obj_attributes.serialize(reply)?;
            granted.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "access failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn check_access(
    args: &ACCESS3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<(post_op_attr, u32), NfsError> {
    let resolved = resolve_handle(&args.object, session, shares).await?;
    let driver = resolved.driver();
    let info = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();
    let obj_attributes = attr::post_op(info.as_ref(), resolved.fsid());

    if resolved.kind == HandleKind::Share {
        return Ok((obj_attributes, args.access));
    }

    let mut granted = args.access;
    if !resolved.tree.is_writable() {
        granted &= READ_ONLY_MASK;
    }
    if info.as_ref().is_some_and(|info| info.is_read_only()) {
        granted &= !(ACCESS3_MODIFY | ACCESS3_EXTEND | ACCESS3_DELETE);
    }

    Ok((obj_attributes, granted))
}
