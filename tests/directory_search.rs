//! READDIR/READDIRPLUS: pagination against the byte budget, cookie
//! verifier handling, slot lifecycle, and restart-after-loss.

mod support;

use std::collections::HashSet;

use nfs_harbor::protocol::nfs::cookie;
use nfs_harbor::protocol::nfs::handle::{self, HandleKind};
use nfs_harbor::xdr::nfs3::dir::{entry3, entryplus3, READDIR3args, READDIRPLUS3args};
use nfs_harbor::xdr::nfs3::{nfsstat3, post_op_attr, post_op_fh3, NFSProcedure};

use support::Fixture;

const MAX_COUNT: u32 = 1024;

fn populate(fx: &Fixture, files: usize) {
    for i in 0..files {
        // 16-character names
        fx.driver.add_file(&format!("/file{i:012}"), b"x");
    }
}

struct Batch {
    verifier: [u8; 8],
    entries: Vec<entry3>,
    eof: bool,
}

async fn read_batch(fx: &Fixture, cookie: u64, verifier: [u8; 8]) -> Result<Batch, nfsstat3> {
    let args = READDIR3args {
        dir: fx.share_handle(),
        cookie,
        cookieverf: verifier,
        count: MAX_COUNT,
    };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_READDIR, &args).await;
    assert!(
        reply.cursor.get_ref().len() <= MAX_COUNT as usize,
        "reply exceeds the client's byte budget"
    );
    if reply.status != nfsstat3::NFS3_OK {
        return Err(reply.status);
    }
    let _dir_attr = reply.take::<post_op_attr>();
    let verifier = reply.take::<[u8; 8]>();
    let mut entries = Vec::new();
    while reply.take::<bool>() {
        entries.push(reply.take::<entry3>());
    }
    let eof = reply.take::<bool>();
    Ok(Batch { verifier, entries, eof })
}

#[tokio::test]
async fn readdir_paginates_and_resumes_until_eof() {
    let fx = Fixture::new();
    populate(&fx, 1000);

    let first = read_batch(&fx, 0, [0u8; 8]).await.expect("first batch");
    assert!(!first.eof);
    assert!(first.entries.len() > 2, "first batch should hold dot entries plus files");
    assert_eq!(first.entries[0].name.as_bytes(), b".");
    assert_eq!(first.entries[1].name.as_bytes(), b"..");
    assert_eq!(
        cookie::resume_of(first.entries[0].cookie),
        cookie::COOKIE_DOT,
        "dot entry carries its reserved resume id"
    );
    assert_eq!(cookie::resume_of(first.entries[1].cookie), cookie::COOKIE_DOT_DOT);

    let verifier = first.verifier;
    let mut seen: Vec<String> = first.entries.iter().map(|e| e.name.to_string()).collect();
    let mut cookie_val = first.entries.last().expect("entries").cookie;

    loop {
        let batch = read_batch(&fx, cookie_val, verifier).await.expect("batch");
        assert_eq!(batch.verifier, verifier, "verifier is stable while the directory is");
        for entry in &batch.entries {
            seen.push(entry.name.to_string());
        }
        if batch.eof {
            break;
        }
        assert!(!batch.entries.is_empty(), "non-eof batch must make progress");
        cookie_val = batch.entries.last().expect("entries").cookie;
    }

    // Exactly the dot entries plus every file, no duplicates, no gaps.
    assert_eq!(seen.len(), 1002);
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), 1002);
}

#[tokio::test]
async fn readdir_rejects_a_foreign_verifier() {
    let fx = Fixture::new();
    populate(&fx, 50);

    let first = read_batch(&fx, 0, [0u8; 8]).await.expect("first batch");
    let cookie_val = first.entries.last().expect("entries").cookie;

    // Native and swapped forms are accepted.
    let mut swapped = first.verifier;
    swapped.reverse();
    assert!(read_batch(&fx, cookie_val, first.verifier).await.is_ok());
    assert!(read_batch(&fx, cookie_val, swapped).await.is_ok());

    // Anything else is a bad cookie.
    let wrong = cookie::verifier_for_mtime(fx.driver.mtime_of("/") + 1);
    let status = match read_batch(&fx, cookie_val, wrong).await {
        Err(status) => status,
        Ok(_) => panic!("a foreign verifier must be rejected"),
    };
    assert_eq!(status, nfsstat3::NFS3ERR_BAD_COOKIE);
}

#[tokio::test]
async fn readdir_frees_its_slot_at_eof() {
    let fx = Fixture::new();
    populate(&fx, 3);

    let batch = read_batch(&fx, 0, [0u8; 8]).await.expect("batch");
    assert!(batch.eof);
    let slot = cookie::slot_of(batch.entries.last().expect("entries").cookie);
    assert!(
        fx.session.search_context(slot).is_none(),
        "a finished enumeration must release its search slot"
    );
}

#[tokio::test]
async fn readdir_restarts_when_the_slot_is_gone() {
    let fx = Fixture::new();
    populate(&fx, 200);

    let first = read_batch(&fx, 0, [0u8; 8]).await.expect("first batch");
    assert!(!first.eof);
    let resume_cookie = first.entries.last().expect("entries").cookie;
    let slot = cookie::slot_of(resume_cookie);

    // Simulate slot loss between calls.
    assert!(fx.session.deallocate_search_slot(slot).is_some());

    let batch = read_batch(&fx, resume_cookie, first.verifier).await.expect("restarted batch");
    let first_name = batch.entries.first().expect("entries").name.to_string();
    let last_before = first.entries.last().expect("entries").name.to_string();
    assert!(
        first_name > last_before,
        "restarted enumeration must continue after {last_before}, got {first_name}"
    );
}

async fn read_plus(
    fx: &Fixture,
    cookie: u64,
    verifier: [u8; 8],
    dircount: u32,
    maxcount: u32,
) -> (Vec<entryplus3>, bool) {
    let args = READDIRPLUS3args {
        dir: fx.share_handle(),
        cookie,
        cookieverf: verifier,
        dircount,
        maxcount,
    };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_READDIRPLUS, &args).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    assert!(reply.cursor.get_ref().len() <= maxcount as usize);
    let _dir_attr = reply.take::<post_op_attr>();
    let _verifier = reply.take::<[u8; 8]>();
    let mut entries = Vec::new();
    while reply.take::<bool>() {
        entries.push(reply.take::<entryplus3>());
    }
    let eof = reply.take::<bool>();
    (entries, eof)
}

#[tokio::test]
async fn readdirplus_honors_the_entry_limit() {
    let fx = Fixture::new();
    populate(&fx, 100);

    let (entries, eof) = read_plus(&fx, 0, [0u8; 8], 10, 64 * 1024).await;
    assert_eq!(entries.len(), 10, "dircount caps the number of entries");
    assert!(!eof);
}

#[tokio::test]
async fn readdirplus_entries_carry_usable_handles_and_attributes() {
    let fx = Fixture::new();
    fx.driver.add_file("/a.txt", b"alpha");
    fx.driver.add_dir("/sub");

    let (entries, eof) = read_plus(&fx, 0, [0u8; 8], 64, 64 * 1024).await;
    assert!(eof);
    // ".", "..", "a.txt", "sub"
    assert_eq!(entries.len(), 4);

    for entry in &entries {
        let post_op_attr::attributes(attr) = entry.name_attributes else {
            panic!("every entry carries attributes");
        };
        assert_eq!(attr.fileid, entry.fileid);
        let post_op_fh3::handle(fh) = &entry.name_handle else {
            panic!("every entry carries a handle");
        };
        assert!(handle::is_valid(fh));
    }

    let file_entry =
        entries.iter().find(|e| e.name.as_bytes() == b"a.txt").expect("file entry");
    let post_op_fh3::handle(fh) = &file_entry.name_handle else { unreachable!() };
    assert_eq!(handle::kind_of(fh), Some(HandleKind::File));

    // The minted handle resolves without any prior LOOKUP.
    let attr = fx.getattr(fh).await;
    assert_eq!(attr.size, 5);

    let dir_entry = entries.iter().find(|e| e.name.as_bytes() == b"sub").expect("dir entry");
    let post_op_fh3::handle(fh) = &dir_entry.name_handle else { unreachable!() };
    assert_eq!(handle::kind_of(fh), Some(HandleKind::Directory));
}

#[tokio::test]
async fn empty_directory_lists_only_dot_entries() {
    let fx = Fixture::new();
    fx.driver.add_dir("/empty");
    let dir = fx.lookup(&fx.share_handle(), "empty").await;

    let args = READDIR3args { dir, cookie: 0, cookieverf: [0u8; 8], count: MAX_COUNT };
    let mut reply = fx.call(NFSProcedure::NFSPROC3_READDIR, &args).await;
    assert_eq!(reply.status, nfsstat3::NFS3_OK);
    let _dir_attr = reply.take::<post_op_attr>();
    let _verifier = reply.take::<[u8; 8]>();
    let mut names = Vec::new();
    while reply.take::<bool>() {
        names.push(reply.take::<entry3>().name.to_string());
    }
    assert!(reply.take::<bool>(), "empty directory is eof immediately");
    assert_eq!(names, [".", ".."]);
}
