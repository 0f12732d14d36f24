//! READ procedure (RFC 1813 section 3.3.6).
//!
//! The file is opened through the session's open-file cache (read
//! access suffices, a cached read-write grant is reused) and the
//! driver call happens with the file's monitor held, keeping the read
//! atomic against concurrent truncation or close of the same open
//! file. End-of-file is reported when the read reaches the current
//! file size.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::FileAccess;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{open_network_file, resolve_handle};
use crate::protocol::nfs::v3::MAX_READ_SIZE;
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::file::READ3args;
use crate::protocol::xdr::nfs3::{nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

/// Reply bytes beyond the data itself: RPC header, status, attributes,
/// count and eof.
const READ_REPLY_OVERHEAD: usize = 160;

struct ReadReply {
    file_attributes: post_op_attr,
    count: u32,
    eof: bool,
    data: Vec<u8>,
}

pub async fn nfsproc3_read(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<READ3args>(input)?;
    debug!(xid, offset = args.offset, count = args.count, "nfsproc3_read");

    match read(&args, session, shares).await {
        Ok(res) => {
            reply.grow(pool, READ_REPLY_OVERHEAD + res.data.len());
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.file_attributes.serialize(reply)?;
            res.count.serialize(reply)?;
            res.eof.serialize(reply)?;
            res.data.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "read failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

async fn read(
    args: &READ3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<ReadReply, NfsError> {
    let resolved = resolve_handle(&args.file, session, shares).await?;
    if resolved.kind != HandleKind::File {
        return Err(NfsError::InVal);
    }

    let file = open_network_file(session, &resolved, FileAccess::ReadOnly).await?;
    let driver = resolved.driver();

    let mut guard = file.lock().await;
    let count = args.count.min(MAX_READ_SIZE);
    let mut data = vec![0u8; count as usize];
    let read = driver
        .read_file(session, &resolved.tree, &mut guard, &mut data, args.offset)
        .await?;
    data.truncate(read as usize);
    let eof = args.offset + u64::from(read) >= guard.size;
    let open_size = guard.size;
    drop(guard);

    let info = driver
        .file_information(session, &resolved.tree, &resolved.path)
        .await
        .map(|mut info| {
            info.size = open_size;
            info
        })
        .ok();

    Ok(ReadReply {
        file_attributes: attr::post_op(info.as_ref(), resolved.fsid()),
        count: read,
        eof,
        data,
    })
}
