//! READDIRPLUS procedure (RFC 1813 section 3.3.17): READDIR with
//! attributes and a file handle per entry.
//!
//! Two limits apply at once: the entry count is capped by `dircount`
//! and the reply bytes by `maxcount`; whichever is reached first spills
//! the remaining entries back into the search. Because every emitted
//! entry carries a freshly minted handle, the handler also primes the
//! share's file-id cache for each one, so clients that proceed
//! straight to per-entry operations resolve without driver help.

use std::io::{Read, Write};

use tracing::{debug, trace, warn};

use crate::driver::FileInfo;
use crate::protocol::nfs::attr;
use crate::protocol::nfs::cookie;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::{self, HandleKind};
use crate::protocol::nfs::v3::common::{
    acquire_search, parent_of, put, resolve_handle, Resolved, SearchStart,
};
use crate::protocol::rpc::{PacketPool, ReplyPacket, MAX_REPLY_SIZE};
use crate::protocol::xdr::nfs3::dir::{entryplus3, READDIRPLUS3args};
use crate::protocol::xdr::nfs3::{nfs_fh3, nfsstat3, post_op_attr, post_op_fh3};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

const REPLY_TRAILER: usize = 8;

pub async fn nfsproc3_readdirplus(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<READDIRPLUS3args>(input)?;
    debug!(
        xid,
        cookie = args.cookie,
        dircount = args.dircount,
        maxcount = args.maxcount,
        "nfsproc3_readdirplus"
    );

    let mark = reply.mark();
    match read_directory_plus(xid, &args, reply, pool, session, shares).await {
        Ok(()) => Ok(nfsstat3::NFS3_OK),
        Err(err) => {
            warn!(xid, %err, "readdirplus failed");
            reply.truncate(mark);
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            post_op_attr::Void.serialize(reply)?;
            Ok(status)
        }
    }
}

fn pack_entry(scratch: &mut Vec<u8>, entry: &entryplus3) -> Result<(), NfsError> {
    scratch.clear();
    put(scratch, &true)?;
    put(scratch, entry)
}

/// Builds one reply entry and records its id/path pair in the share's
/// file-id cache.
fn plus_entry(
    resolved: &Resolved,
    dir_id: u32,
    info: &FileInfo,
    path: String,
    cookie: u64,
) -> entryplus3 {
    let share = resolved.share();
    share.file_ids().add_path(info.file_id, &path);
    let fh: nfs_fh3 = if info.is_directory() {
        handle::pack_directory_handle(share.id(), info.file_id)
    } else {
        handle::pack_file_handle(share.id(), dir_id, info.file_id)
    };
    entryplus3 {
        fileid: attr::wire_file_id(info.file_id),
        name: info.name.as_str().into(),
        cookie,
        name_attributes: attr::post_op(Some(info), resolved.fsid()),
        name_handle: post_op_fh3::handle(fh),
    }
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

async fn read_directory_plus(
    xid: u32,
    args: &READDIRPLUS3args,
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

    let budget = (args.maxcount as usize).min(MAX_REPLY_SIZE);
    let max_entries = args.dircount as usize;
    reply.grow(pool, budget);

    put(reply, &make_success_reply(xid))?;
    put(reply, &nfsstat3::NFS3_OK)?;
    put(reply, &attr::post_op(Some(&dir_info), resolved.fsid()))?;
    put(reply, &cookie::verifier_for_mtime(mtime))?;

    let share = resolved.share();
    share.file_ids().add_path(dir_info.file_id, &resolved.path);

    let mut guard = search.lock().await;

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
    let mut emitted = 0usize;

    if matches!(start, SearchStart::FromTop) {
        let dir_handle = if resolved.kind == HandleKind::Share {
            handle::pack_share_handle(share.id())
        } else {
            handle::pack_directory_handle(share.id(), dir_info.file_id)
        };
        let dot = entryplus3 {
            fileid: attr::wire_file_id(dir_info.file_id),
            name: ".".into(),
            cookie: cookie::encode(slot, cookie::COOKIE_DOT),
            name_attributes: attr::post_op(Some(&dir_info), resolved.fsid()),
            name_handle: post_op_fh3::handle(dir_handle),
        };
        pack_entry(&mut scratch, &dot)?;
        if emitted < max_entries && reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
            emitted += 1;
        } else {
            complete = false;
        }
    }
    if complete && matches!(start, SearchStart::FromTop | SearchStart::AfterDot) {
        let parent = if resolved.path == "/" {
            dir_info.clone()
        } else {
            let parent_path = parent_of(&resolved.path).to_string();
            let info = driver
                .file_information(session, &resolved.tree, &parent_path)
                .await
                .unwrap_or_else(|_| dir_info.clone());
            share.file_ids().add_path(info.file_id, &parent_path);
            info
        };
        let dot_dot = entryplus3 {
            fileid: attr::wire_file_id(parent.file_id),
            name: "..".into(),
            cookie: cookie::encode(slot, cookie::COOKIE_DOT_DOT),
            name_attributes: attr::post_op(Some(&parent), resolved.fsid()),
            name_handle: post_op_fh3::handle(handle::pack_directory_handle(
                share.id(),
                parent.file_id,
            )),
        };
        pack_entry(&mut scratch, &dot_dot)?;
        if emitted < max_entries && reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
            emitted += 1;
        } else {
            complete = false;
        }
    }

    while complete {
        if emitted >= max_entries {
            // Entry quota reached with the search already positioned at
            // the next entry; the reply just stops early.
            complete = false;
            break;
        }
        let at = guard.resume_id();
        let Some(info) = guard.next_file_info().await? else {
            eof = true;
            break;
        };
        let entry = plus_entry(
            &resolved,
            dir_info.file_id,
            &info,
            child_path(&resolved.path, &info.name),
            cookie::encode(slot, guard.resume_id()),
        );
        pack_entry(&mut scratch, &entry)?;
        if reply.len() + scratch.len() + REPLY_TRAILER <= budget {
            trace!(name = %info.name, at, "readdirplus entry");
            reply.write_all(&scratch).map_err(|_| NfsError::ServerFault)?;
            emitted += 1;
        } else {
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
