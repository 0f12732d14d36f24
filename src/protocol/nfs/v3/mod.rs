//! The NFS version 3 procedure dispatcher.
//!
//! The transport parses the RPC call header and hands the engine an
//! [`RpcPacket`] positioned at the procedure parameters. The dispatcher
//! selects the handler by procedure number, lets it build the reply in
//! a pooled [`ReplyPacket`] (growing it when the projected response is
//! larger), and unconditionally ends the session's per-request driver
//! transaction afterwards: committed when the handler answered
//! `NFS3_OK`, rolled back otherwise. Ownership of the finished reply
//! transfers back to the transport.

use num_traits::cast::FromPrimitive;
use tracing::{debug, warn};

use crate::protocol::rpc::{PacketPool, ReplyPacket, RpcPacket, DEFAULT_REPLY_SIZE};
use crate::protocol::xdr::rpc::{call_body, proc_unavail_reply, prog_mismatch_reply};
use crate::protocol::xdr::{nfs3, Serialize};
use crate::session::{Session, DBG_DISPATCH};
use crate::share::ShareRegistry;

mod common;

mod access;
mod commit;
mod create;
mod fsinfo;
mod fsstat;
mod getattr;
mod link;
mod lookup;
mod mkdir;
mod mknod;
mod null;
mod pathconf;
mod read;
mod readdir;
mod readdirplus;
mod readlink;
mod remove;
mod rename;
mod rmdir;
mod setattr;
mod symlink;
mod write;

use access::nfsproc3_access;
use commit::nfsproc3_commit;
use create::nfsproc3_create;
use fsinfo::nfsproc3_fsinfo;
use fsstat::nfsproc3_fsstat;
use getattr::nfsproc3_getattr;
use link::nfsproc3_link;
use lookup::nfsproc3_lookup;
use mkdir::nfsproc3_mkdir;
use mknod::nfsproc3_mknod;
use null::nfsproc3_null;
use pathconf::nfsproc3_pathconf;
use read::nfsproc3_read;
use readdir::nfsproc3_readdir;
use readdirplus::nfsproc3_readdirplus;
use readlink::nfsproc3_readlink;
use remove::nfsproc3_remove;
use rename::nfsproc3_rename;
use rmdir::nfsproc3_rmdir;
use setattr::nfsproc3_setattr;
use symlink::nfsproc3_symlink;
use write::nfsproc3_write;

/// Largest READ the server accepts, advertised through FSINFO.
pub const MAX_READ_SIZE: u32 = 64 * 1024;
/// Largest WRITE the server accepts, advertised through FSINFO.
pub const MAX_WRITE_SIZE: u32 = 64 * 1024;
/// Preferred transfer size advertised through FSINFO.
pub const PREFERRED_IO_SIZE: u32 = 32 * 1024;
/// Suggested transfer multiple advertised through FSINFO.
pub const IO_SIZE_MULTIPLE: u32 = 4096;
/// Preferred READDIR request size advertised through FSINFO.
pub const PREFERRED_DIR_SIZE: u32 = 8192;

/// Processes one NFS version 3 call and returns the finished reply
/// packet.
pub async fn process_request(
    xid: u32,
    call: &call_body,
    request: &RpcPacket,
    session: &Session,
    shares: &ShareRegistry,
    pool: &PacketPool,
) -> anyhow::Result<ReplyPacket> {
    let mut input = request.params();
    let mut reply = pool.allocate(request, DEFAULT_REPLY_SIZE);

    if call.vers != nfs3::VERSION {
        warn!(vers = call.vers, "call at unsupported NFS version");
        prog_mismatch_reply(xid, nfs3::VERSION).serialize(&mut reply)?;
        return Ok(reply);
    }

    let Some(procedure) = nfs3::NFSProcedure::from_u32(call.proc) else {
        warn!(proc = call.proc, "call of unknown NFS procedure");
        proc_unavail_reply(xid).serialize(&mut reply)?;
        return Ok(reply);
    };

    if session.has_debug(DBG_DISPATCH) {
        debug!(session = session.id(), xid, ?procedure, "dispatching");
    }

    let status = match procedure {
        nfs3::NFSProcedure::NFSPROC3_NULL => nfsproc3_null(xid, &mut reply)?,
        nfs3::NFSProcedure::NFSPROC3_GETATTR => {
            nfsproc3_getattr(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_SETATTR => {
            nfsproc3_setattr(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_LOOKUP => {
            nfsproc3_lookup(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_ACCESS => {
            nfsproc3_access(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_READLINK => {
            nfsproc3_readlink(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_READ => {
            nfsproc3_read(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_WRITE => {
            nfsproc3_write(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_CREATE => {
            nfsproc3_create(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_MKDIR => {
            nfsproc3_mkdir(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_SYMLINK => {
            nfsproc3_symlink(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_MKNOD => {
            nfsproc3_mknod(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_REMOVE => {
            nfsproc3_remove(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_RMDIR => {
            nfsproc3_rmdir(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_RENAME => {
            nfsproc3_rename(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_LINK => {
            nfsproc3_link(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_READDIR => {
            nfsproc3_readdir(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_READDIRPLUS => {
            nfsproc3_readdirplus(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_FSSTAT => {
            nfsproc3_fsstat(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_FSINFO => {
            nfsproc3_fsinfo(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_PATHCONF => {
            nfsproc3_pathconf(xid, &mut input, &mut reply, pool, session, shares).await?
        }
        nfs3::NFSProcedure::NFSPROC3_COMMIT => {
            nfsproc3_commit(xid, &mut input, &mut reply, pool, session, shares).await?
        }
    };

    session.end_transaction(status == nfs3::nfsstat3::NFS3_OK).await;

    Ok(reply)
}
