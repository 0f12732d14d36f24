//! SETATTR procedure (RFC 1813 section 3.3.2).
//!
//! Size changes are truncation and go through the open-file path: the
//! file is opened (or fetched) via the session cache with write access
//! and the driver truncates under the file's monitor. Every other
//! attribute is delegated to the driver's attribute update in one
//! call. The ctime guard is parsed for wire correctness but not
//! enforced.

use std::io::Read;

use tracing::{debug, warn};

use crate::driver::{FileAccess, FileTimeMs, SetInfo};
use crate::protocol::nfs::attr;
use crate::protocol::nfs::error::NfsError;
use crate::protocol::nfs::handle::HandleKind;
use crate::protocol::nfs::v3::common::{open_network_file, require_writable, resolve_handle};
use crate::protocol::rpc::{PacketPool, ReplyPacket};
use crate::protocol::xdr::nfs3::{
    nfsstat3, sattr3, set_gid3, set_mode3, set_size3, set_time, set_uid3, wcc_data, SETATTR3args,
};
use crate::protocol::xdr::rpc::make_success_reply;
use crate::protocol::xdr::{deserialize, Serialize};
use crate::session::Session;
use crate::share::ShareRegistry;

pub async fn nfsproc3_setattr(
    xid: u32,
    input: &mut impl Read,
    reply: &mut ReplyPacket,
    _pool: &PacketPool,
    session: &Session,
    shares: &ShareRegistry,
) -> anyhow::Result<nfsstat3> {
    let args = deserialize::<SETATTR3args>(input)?;
    debug!(xid, ?args, "nfsproc3_setattr");

    match set_attributes(&args, session, shares).await {
        Ok(obj_wcc) => {
            make_success_reply(xid).serialize(reply)?;
            nfsstat3::NFS3_OK.serialize(reply)?;
            obj_wcc.serialize(reply)?;
            Ok(nfsstat3::NFS3_OK)
        }
        Err(err) => {
            warn!(xid, %err, "setattr failed");
            let status = err.status();
            make_success_reply(xid).serialize(reply)?;
            status.serialize(reply)?;
            wcc_data::default().serialize(reply)?;
            Ok(status)
        }
    }
}

fn time_change(how: set_time) -> Option<FileTimeMs> {
    match how {
        set_time::DONT_CHANGE => None,
        set_time::SET_TO_SERVER_TIME => Some(FileTimeMs::now()),
        set_time::SET_TO_CLIENT_TIME(t) => Some(FileTimeMs::from_seconds(t.seconds)),
    }
}

fn changes_of(new: &sattr3) -> SetInfo {
    SetInfo {
        mode: match new.mode {
            set_mode3::mode(m) => Some(m),
            set_mode3::Void => None,
        },
        uid: match new.uid {
            set_uid3::uid(u) => Some(u),
            set_uid3::Void => None,
        },
        gid: match new.gid {
            set_gid3::gid(g) => Some(g),
            set_gid3::Void => None,
        },
        access_time: time_change(new.atime),
        modify_time: time_change(new.mtime),
    }
}

async fn set_attributes(
    args: &SETATTR3args,
    session: &Session,
    shares: &ShareRegistry,
) -> Result<wcc_data, NfsError> {
    let resolved = resolve_handle(&args.object, session, shares).await?;
    require_writable(&resolved.tree)?;
    let driver = resolved.driver();

    let pre = driver.file_information(session, &resolved.tree, &resolved.path).await?;

    if let set_size3::size(new_size) = args.new_attributes.size {
        if resolved.kind != HandleKind::File {
            return Err(NfsError::InVal);
        }
        let file = open_network_file(session, &resolved, FileAccess::ReadWrite).await?;
        let mut guard = file.lock().await;
        driver.truncate_file(session, &resolved.tree, &mut guard, new_size).await?;
        guard.size = new_size;
    }

    let changes = changes_of(&args.new_attributes);
    if !changes.is_empty() {
        driver
            .set_file_information(session, &resolved.tree, &resolved.path, &changes)
            .await?;
    }

    let post = driver.file_information(session, &resolved.tree, &resolved.path).await.ok();
    Ok(attr::wcc(Some(&pre), post.as_ref(), resolved.fsid()))
}
