//! Handle resolution end to end: LOOKUP minting handles, GETATTR
//! reading them back, and the stale/bad handle paths.

mod support;

use nfs_harbor::protocol::nfs::handle::{self, HandleKind, ID_NONE};
use nfs_harbor::xdr::nfs3::{self, nfsstat3, post_op_attr, NFSProcedure};

use support::{Fixture, MemDriver};

#[tokio::test]
async fn lookup_then_getattr_reports_driver_metadata() {
    let fx = Fixture::new();
    fx.driver.add_file_with_id("/hello.txt", 42, b"hello", Some(0o100644));

    let root = fx.share_handle();
    let mut reply = fx.try_lookup(&root, "hello.txt").await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);

    let fh = reply.take::<nfs3::nfs_fh3>();
    assert_eq!(handle::kind_of(&fh), Some(HandleKind::File));
    assert_eq!(handle::unpack_share_id(&fh), fx.share.id());
    assert_eq!(handle::unpack_file_id(&fh), 42);

    let post_op_attr::attributes(obj) = reply.take::<post_op_attr>() else {
        panic!("lookup must return object attributes");
    };
    assert_eq!(obj.size, 5);
    assert_eq!(obj.mode, 0o100644);
    // driver id 42 plus the wire offset of 2
    assert_eq!(obj.fileid, 44);

    let post_op_attr::attributes(dir) = reply.take::<post_op_attr>() else {
        panic!("lookup must return directory attributes");
    };
    assert_eq!(dir.ftype, nfs3::ftype3::NF3DIR);
    assert_eq!(dir.size, 512);

    let attr = fx.getattr(&fh).await;
    assert_eq!(attr.size, 5);
    assert_eq!(attr.mode, 0o100644);
    assert_eq!(attr.fileid, 44);
    assert_eq!(attr.ftype, nfs3::ftype3::NF3REG);
}

#[tokio::test]
async fn lookup_missing_name_returns_noent() {
    let fx = Fixture::new();
    let reply = fx.try_lookup(&fx.share_handle(), "absent").await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_NOENT);
}

#[tokio::test]
async fn lookup_dot_and_dotdot_resolve_to_directories() {
    let fx = Fixture::new();
    fx.driver.add_dir("/d");
    fx.driver.add_file("/d/f", b"x");

    let root = fx.share_handle();
    let d = fx.lookup(&root, "d").await;
    assert_eq!(handle::kind_of(&d), Some(HandleKind::Directory));

    let mut reply = fx.try_lookup(&d, "..").await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _fh = reply.take::<nfs3::nfs_fh3>();
    let post_op_attr::attributes(obj) = reply.take::<post_op_attr>() else {
        panic!("dotdot attributes");
    };
    // the share root has driver id 1
    assert_eq!(obj.fileid, 3);

    let mut reply = fx.try_lookup(&d, ".").await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let dot_fh = reply.take::<nfs3::nfs_fh3>();
    assert_eq!(handle::unpack_directory_id(&dot_fh), handle::unpack_directory_id(&d));
}

#[tokio::test]
async fn malformed_handle_is_bad_handle() {
    let fx = Fixture::new();
    let garbage = nfs3::nfs_fh3 { data: vec![0u8; 32] };
    let reply = fx.call(NFSProcedure::NFSPROC3_GETATTR, &garbage).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_BADHANDLE);

    let short = nfs3::nfs_fh3 { data: vec![1u8; 7] };
    let reply = fx.call(NFSProcedure::NFSPROC3_GETATTR, &short).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_BADHANDLE);
}

#[tokio::test]
async fn cold_cache_without_file_id_support_is_stale() {
    let fx = Fixture::new();
    fx.driver.add_file_with_id("/a", 900, b"abc", None);
    assert!(!fx.share.has_file_id_support());

    // A well-formed handle whose id was never seen by this instance.
    let fh = handle::pack_file_handle(fx.share.id(), ID_NONE, 900);
    let reply = fx.call(NFSProcedure::NFSPROC3_GETATTR, &fh).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_STALE);

    let read = nfs3::file::READ3args { file: fh, offset: 0, count: 16 };
    let reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_STALE);
}

#[tokio::test]
async fn file_id_lookup_re_resolves_a_cold_cache() {
    let fx = Fixture::with_driver(MemDriver::with_options(false, true), true);
    fx.driver.add_file_with_id("/a", 7, b"abc", None);
    assert!(fx.share.has_file_id_support());

    let fh = handle::pack_file_handle(fx.share.id(), ID_NONE, 7);
    let attr = fx.getattr(&fh).await;
    assert_eq!(attr.size, 3);

    // The resolution primed the cache.
    assert_eq!(fx.share.file_ids().find_path(7).as_deref(), Some("/a"));
}

#[tokio::test]
async fn unknown_share_is_stale() {
    let fx = Fixture::new();
    let fh = handle::pack_share_handle(fx.share.id() ^ 0x5555_5555);
    let reply = fx.call(NFSProcedure::NFSPROC3_GETATTR, &fh).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_STALE);
}
