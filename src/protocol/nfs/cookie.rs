//! Directory search cookies and cookie verifiers.
//!
//! A 64-bit cookie is partitioned as `(slot_id << 24) | resume_id`: the
//! session's search-slot id in the upper byte of the low 32 bits, a
//! 24-bit resume id below it. Bits 32..63 are zero on emit and ignored
//! on receive. The top two resume ids are reserved for the synthetic
//! `.` and `..` entries, which only ever appear in the first reply of a
//! listing.
//!
//! The verifier is the directory's modify time in milliseconds as eight
//! big-endian bytes. Some older clients return it byte-swapped, so both
//! orders are accepted; zero is always accepted because first calls
//! carry it.

use crate::protocol::xdr::nfs3::{cookie3, cookieverf3};

/// Bits available for the resume id.
pub const RESUME_ID_MASK: u32 = 0x00FF_FFFF;

/// Reserved resume id of the synthetic `.` entry.
pub const COOKIE_DOT: u32 = 0x00FF_FFFF;

/// Reserved resume id of the synthetic `..` entry.
pub const COOKIE_DOT_DOT: u32 = 0x00FF_FFFE;

/// Largest resume id an actual directory entry may carry.
pub const RESUME_ID_LIMIT: u32 = COOKIE_DOT_DOT;

const SLOT_SHIFT: u32 = 24;

/// Packs a slot id and resume id into a wire cookie.
pub fn encode(slot: u8, resume_id: u32) -> cookie3 {
    (u64::from(slot) << SLOT_SHIFT) | u64::from(resume_id & RESUME_ID_MASK)
}

/// Slot id of a wire cookie. The high 32 bits are ignored.
pub fn slot_of(cookie: cookie3) -> u8 {
    ((cookie >> SLOT_SHIFT) & 0xFF) as u8
}

/// Resume id of a wire cookie.
pub fn resume_of(cookie: cookie3) -> u32 {
    (cookie as u32) & RESUME_ID_MASK
}

/// Verifier for a directory whose modify time is `mtime_millis`.
pub fn verifier_for_mtime(mtime_millis: u64) -> cookieverf3 {
    mtime_millis.to_be_bytes()
}

/// Whether a client-presented verifier is acceptable for a directory
/// with the given modify time: zero, the native encoding, or the
/// byte-swapped encoding.
pub fn verifier_matches(presented: cookieverf3, mtime_millis: u64) -> bool {
    if presented == cookieverf3::default() {
        return true;
    }
    let native = verifier_for_mtime(mtime_millis);
    if presented == native {
        return true;
    }
    let mut swapped = native;
    swapped.reverse();
    presented == swapped
}
