//! WRITE procedure (RFC 1813 section 3.3.7).
//!
//! The open file is fetched through the session cache with read-write
//! access, upgrading a cached read-only grant by reopening. The file's
//! monitor is held across the driver write, and the weak cache
//! consistency bracket is captured around it. Writes are performed
//! through to the driver, so the reply always reports `FILE_SYNC`
//! regardless of the stability the client asked for, and the verifier
//! is the instance-wide write verifier echoed again by COMMIT.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::FileAccess;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{open_network_file, require_writable, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::file::{stable_how, WRITE3args, WRITE3resok};
use crate::protocol::xdr::nfs3::{nfsstat3, wcc_data};
use crate::protocol::xdr::rpc::{garbage_args_reply, make_success_reply};
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_write(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<WRITE3args>(input)?;
    debug!(xid, offset = args.offset, count = args.count, ?args.stable, "nfsproc3_write");

    if args.data.len() != args.count as usize {
        warn!(xid, count = args.count, len = args.data.len(), "write count mismatch");
        garbage_args_reply(xid).serialize(reply)?;
        return Ok(nfsstat3::NFS3ERR_INVAL);
    }

    match write(&args, session, shares).await {
        Ok(res) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            res.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "write failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

async fn write(
    args: &WRITE3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<WRITE3resok, NfsError> {
    let resolved = resolve_handle(&args.file, session, shares).await?;
    if resolved.kind != HandleKind::File {
        return Err(NfsError::InVal);
    }
    require_writable(&resolved.tree)?;

    let file = open_network_file(session, &resolved, FileAccess::ReadWrite).await?;
    let driver = resolved.driver();

    let pre = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();

    let mut guard = file.lock().await;
    let written = driver
        .write_file(session, &resolved.tree, &mut guard, &args.data, args.offset)
        .await?;
    guard.size = guard.size.max(args.offset + u64::from(written));
    let open_size = guard.size;
    drop(guard);

    let post = driver
        .file_information(session, &resolved.tree, &resolved.path)
        .await
        .map(|mut info| {
            info.size = open_size;
            info
        })
        .ok();

    Ok(WRITE3resok {
        file_wcc: attr::wcc(pre.as_ref(), post.as_ref(), resolved.fsid()),
        count: written,
        committed: stable_how::FILE_SYNC,
        verf: shares.write_verifier(),
    })
}
