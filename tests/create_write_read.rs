//! The create/write/read/commit cycle, the open-file cache it rides
//! on, and the write failure paths.

mod support;

use nfs_harbor::protocol::nfs::handle;
use nfs_harbor::xdr::nfs3::file::{createhow3, stable_how, CREATE3args, READ3args, WRITE3args};
use nfs_harbor::xdr::nfs3::{
    self, nfsstat3, post_op_attr, post_op_fh3, sattr3, set_mode3, wcc_data, NFSProcedure,
};
use nfs_harbor::xdr::rpc::accept_body;

use support::Fixture;

fn create_args(dir: &nfs3::nfs_fh3, name: &str, mode: u32) -> CREATE3args {
    CREATE3args {
        dirops: nfs3::diropargs3 { dir: dir.clone(), name: name.into() },
        how: createhow3::GUARDED(sattr3 { mode: set_mode3::mode(mode), ..Default::default() }),
    }
}

#[tokio::test]
async fn create_write_read_commit_round_trip() {
    let fx = Fixture::new();
    let root = fx.share_handle();

    // CREATE
    let mut reply =
        fx.call(NFSProcedure::NFSPROC3_CREATE, &create_args(&root, "a.bin", 0o644)).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let post_op_fh3::handle(fh) = reply.take::<post_op_fh3>() else {
        panic!("create must return a handle");
    };
    let post_op_attr::attributes(attr) = reply.take::<post_op_attr>() else {
        panic!("create must return attributes");
    };
    assert_eq!(attr.size, 0);
    assert_eq!(attr.mode, 0o644);
    let _dir_wcc = reply.take::<wcc_data>();

    // The new file is held open by the session.
    let file_id = handle::unpack_file_id(&fh);
    assert!(fx.session.file_cache().find(file_id).is_some());

    // WRITE
    let data = [0xDE, 0xAD, 0xBE, 0xEF];
    let write = WRITE3args {
        file: fh.clone(),
        offset: 0,
        count: 4,
        stable: stable_how::DATA_SYNC,
        data: data.to_vec(),
    };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_WRITE, &write).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _wcc = reply.take::<wcc_data>();
    assert_eq!(reply.take::<u32>(), 4);
    let committed = reply.take::<stable_how>();
    assert_eq!(committed, stable_how::FILE_SYNC);
    let write_verf = reply.take::<[u8; 8]>();

    // READ past the end: all four bytes and eof.
    let read = READ3args { file: fh.clone(), offset: 0, count: 8 };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _attr = reply.take::<post_op_attr>();
    assert_eq!(reply.take::<u32>(), 4);
    assert!(reply.take::<bool>(), "read to the end must set eof");
    assert_eq!(reply.take::<Vec<u8>>(), data.to_vec());

    // COMMIT echoes the same verifier within the instance.
    let commit = nfs3::file::COMMIT3args { file: fh.clone(), offset: 0, count: 0 };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_COMMIT, &commit).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _wcc = reply.take::<wcc_data>();
    assert_eq!(reply.take::<[u8; 8]>(), write_verf);
}

#[tokio::test]
async fn partial_read_does_not_report_eof() {
    let fx = Fixture::new();
    fx.driver.add_file("/f", b"0123456789");
    let fh = fx.lookup(&fx.share_handle(), "f").await;

    let read = READ3args { file: fh, offset: 0, count: 4 };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _attr = reply.take::<post_op_attr>();
    assert_eq!(reply.take::<u32>(), 4);
    assert!(!reply.take::<bool>());
    assert_eq!(reply.take::<Vec<u8>>(), b"0123".to_vec());
}

#[tokio::test]
async fn create_existing_file_is_exist_and_directory_is_isdir() {
    let fx = Fixture::new();
    fx.driver.add_file("/taken", b"");
    fx.driver.add_dir("/dir");
    let root = fx.share_handle();

    let reply = fx.call(NFSProcedure::NFSPROC3_CREATE, &create_args(&root, "taken", 0o644)).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_EXIST);

    let reply = fx.call(NFSProcedure::NFSPROC3_CREATE, &create_args(&root, "dir", 0o644)).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_ISDIR);
}

#[tokio::test]
async fn write_on_full_disk_is_nospc() {
    let fx = Fixture::new();
    fx.driver.add_file("/f", b"x");
    let fh = fx.lookup(&fx.share_handle(), "f").await;
    fx.driver.set_disk_full(true);

    let write = WRITE3args {
        file: fh,
        offset: 0,
        count: 1,
        stable: stable_how::UNSTABLE,
        data: vec![0],
    };
    let reply = fx.call(NFSProcedure::NFSPROC3_WRITE, &write).await;
    assert_eq!(reply.status, nfsstat3::NFS3ERR_NOSPC);
}

#[tokio::test]
async fn write_count_mismatch_is_garbage_args() {
    let fx = Fixture::new();
    fx.driver.add_file("/f", b"x");
    let fh = fx.lookup(&fx.share_handle(), "f").await;

    let write = WRITE3args {
        file: fh,
        offset: 0,
        count: 5,
        stable: stable_how::UNSTABLE,
        data: vec![0; 4],
    };
    let reply = fx.call(NFSProcedure::NFSPROC3_WRITE, &write).await;
    assert!(matches!(reply.body, accept_body::GARBAGE_ARGS));
}

#[tokio::test]
async fn write_upgrades_a_read_only_cache_entry() {
    let fx = Fixture::new();
    fx.driver.add_file("/f", b"abc");
    let fh = fx.lookup(&fx.share_handle(), "f").await;
    let file_id = handle::unpack_file_id(&fh);

    // A READ caches the file read-only.
    let read = READ3args { file: fh.clone(), offset: 0, count: 3 };
    let reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let (_, access) = fx.session.file_cache().find(file_id).expect("cached after read");
    assert_eq!(access, nfs_harbor::driver::FileAccess::ReadOnly);

    // A WRITE reopens with write access and replaces the entry.
    let write = WRITE3args {
        file: fh,
        offset: 3,
        count: 3,
        stable: stable_how::UNSTABLE,
        data: b"def".to_vec(),
    };
    let reply = fx.call(NFSProcedure::NFSPROC3_WRITE, &write).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let (_, access) = fx.session.file_cache().find(file_id).expect("cached after write");
    assert_eq!(access, nfs_harbor::driver::FileAccess::ReadWrite);
    assert_eq!(fx.session.file_cache().len(), 1);
}

#[tokio::test]
async fn idle_open_files_can_be_expired() {
    use std::time::Duration;

    let fx = Fixture::new();
    fx.driver.add_file("/f", b"abc");
    let fh = fx.lookup(&fx.share_handle(), "f").await;

    let read = READ3args { file: fh, offset: 0, count: 3 };
    let reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    assert_eq!(fx.session.file_cache().len(), 1);

    // A generous idle bound keeps the fresh entry.
    assert!(fx.session.file_cache().expire_idle(Duration::from_secs(3600)).is_empty());
    assert_eq!(fx.session.file_cache().len(), 1);

    // Once the entry has aged past the bound, it is handed back.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let evicted = fx.session.file_cache().expire_idle(Duration::from_millis(1));
    assert_eq!(evicted.len(), 1);
    assert!(fx.session.file_cache().is_empty());
}

#[tokio::test]
async fn getattr_prefers_the_open_file_size() {
    let fx = Fixture::new();
    let id = fx.driver.add_file("/f", b"abcdef");
    let fh = fx.lookup(&fx.share_handle(), "f").await;

    // Cache the open file at its current size.
    let read = READ3args { file: fh.clone(), offset: 0, count: 1 };
    let reply = fx.call(NFSProcedure::NFSPROC3_READ, &read).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);

    // The driver's metadata moves behind the open file's back.
    fx.driver.add_file_with_id("/f", id, b"abcdefghijklmnop", None);

    let attr = fx.getattr(&fh).await;
    assert_eq!(attr.size, 6, "size must come from the session's open file");
}
