//! READDIR procedure (RFC 1813 section 3.3.16).
//!
//! Cookies are slot/resume pairs (see the cookie module): the slot
//! names this session's active search, the resume id names the next
//! entry. A zero cookie starts a fresh enumeration and emits the
//! synthetic `.` and `..` entries before the real ones. The reply is
//! built entry by entry against the client's byte budget; an entry
//! that would overflow it is pushed back into the search with
//! `restart_at`, so the next call resumes exactly there.
//!
//! The cookie verifier is the directory's modify time; a stale
//! verifier answers `NFS3ERR_BAD_COOKIE`. A cookie whose slot has been
//! reclaimed restarts the enumeration silently under the current
//! directory state.

use std::io::{Read, Write};

use tracing::{debug, trace, warn};

use crate::protocol::nfs::attr;
use crate::protocol::nfs::cookie;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{
    acquire_search, parent_of, put, resolve_handle, SearchStart,
};
use crate::protocol::rpc::{PacketPool, ReplyPacket, MAX_REPLY_SIZE};
use crate::protocol::xdr::nfs3::dir::{entry3, READDIR3args};
use crate::protocol::xdr::nfs3::{nfsstat3, post_op_attr};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

/// Reserved tail of the reply: the final entry-list terminator and the
/// eof flag.
const REPLY_TRAILER: usize = 8;

pub async fn nfsproc3_readdir(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<READDIR3args>(input)?;
    debug!(xid, cookie = args.cookie, count = args.count, "nfsproc3_readdir");

    let mark = reply.mark();
    match read_directory(xid, &args, reply, pool, session, shares).await {
        Ok(()) => Ok(nfsstat3::NFS3_OK),
        Err(err) => {
            warn!(xid, %err, "readdir failed");
            reply.truncate(mark);
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

/// Serializes one list element (`true` marker plus the entry) into the
/// scratch buffer.
fn pack_entry(scratch: &mut Vec<u8>, entry: &entry3) -> Result<(), NfsError> {
    scratch.clear();
    put(scratch, &true)?;
    put(scratch, entry)
}

async fn read_directory(
    xid: u32,
    args: &READDIR3args,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<(), NfsError> {
    let resolved = resolve_handle(&args.dir, session, shares).await?;
    if resolved.kind == HandleKind::File {
        return Err(NfsError::NotDir);
    }

    let driver = resolved.driver();
    let dir_info = driver.file_information(session, &resolved.tree, &resolved.path).await?;
    let mtime = dir_info.modify_time.as_millis();

    if args.cookie != 0 && !cookie::verifier_matches(args.cookieverf, mtime) {
        return Err(NfsError::BadCookie);
    }

    let (slot, search, start) = acquire_search(session, &resolved, args.cookie).await?;

    let budget = (args.count as usize).min(MAX_REPLY_SIZE);
    reply.grow(pool, budget);

    put(reply, &make_success_reply(xid))?;
    put(reply, &nfsstat3::NFS3_OK)?;
    put(reply, &attr::post_op(Some(&dir_info), resolved.fsid()))?;
    put(reply, &cookie::verifier_for_mtime(mtime))?;

    let mut guard = search.lock().await;

    // Position the enumeration for the incoming cookie.
    match start {
        SearchStart::Resume(resume) => {
            if guard.resume_id() != resume {
                guard.restart_at(resume).await?;
            }
        }
        _ => {
            if guard.resume_id() != 0 {
                guard.restart_at(0).await?;
            }
        }
    }

    let mut scratch: Vec<u8> = Vec::new();
    let mut complete = true;
    let mut eof = false;

    // Synthetic entries, first reply only.
    if matches!(start, SearchStart::FromTop) {
        let dot = entry3 {
            fileid: attr::wire_file_id(dir_info.file_id),
            name: ".".into(),
            cookie: cookie::encode(slot, cookie::COOKIE_DOT),
        };
        pack_entry(&mut scratch, &dot)?;
        if reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
        } else {
            complete = false;
        }
    }
    if complete && matches!(start, SearchStart::FromTop | SearchStart::AfterDot) {
        let parent_id = if resolved.path == "/" {
            dir_info.file_id
        } else {
            driver
                .file_information(session, &resolved.tree, parent_of(&resolved.path))
                .await
                .map(|info| info.file_id)
                .unwrap_or(dir_info.file_id)
        };
        let dot_dot = entry3 {
            fileid: attr::wire_file_id(parent_id),
            name: "..".into(),
            cookie: cookie::encode(slot, cookie::COOKIE_DOT_DOT),
        };
        pack_entry(&mut scratch, &dot_dot)?;
        if reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
        } else {
            complete = false;
        }
    }

    while complete {
        let at = guard.resume_id();
        let Some(info) = guard.next_file_info().await? else {
            eof = true;
            break;
        };
        let entry = entry3 {
            fileid: attr::wire_file_id(info.file_id),
            name: info.name.as_str().into(),
            cookie: cookie::encode(slot, guard.resume_id()),
        };
        pack_entry(&mut scratch, &entry)?;
        if reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            trace!(name = %info.name, at, "readdir entry");
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
        } else {
            // Push the entry back; the next call resumes at it.
            trace!(name = %info.name, at, "budget reached, spilling entry back");
            guard.restart_at(at).await?;
            complete = false;
        }
    }

    put(reply, &false)?;
    let finished = eof && complete;
    put(reply, &finished)?;
    drop(guard);

    if finished {
        if let Some(search) = session.deallocate_search_slot(slot) {
            search.lock().await.close_search().await;
        }
    }

    Ok(())
}
