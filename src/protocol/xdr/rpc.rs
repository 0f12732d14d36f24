//! ONC-RPC message framing (RFC 5531), reduced to what the engine
//! itself produces and consumes.
//!
//! The transport owns connection handling and credential checking; the
//! engine only needs the call header it is handed ([`call_body`]) and a
//! way to frame its replies. Every reply the engine emits is an
//! accepted reply, so the reply side is modeled as the flattened
//! [`reply_msg`] rather than the full call/reply union.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::{deserialize, invalid_data, Deserialize, Serialize};
use crate::{DeserializeEnum, DeserializeStruct, SerializeEnum, SerializeStruct};

/// RPC protocol version spoken on the wire.
pub const RPC_VERSION: u32 = 2;

/// Authentication mechanism identifiers.
#[derive(Copy, Clone, Debug, Default, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum auth_flavor {
    /// No authentication.
    #[default]
    AUTH_NULL = 0,
    /// UNIX-style uid/gid credentials.
    AUTH_UNIX = 1,
    /// Short-form authentication.
    AUTH_SHORT = 2,
}
SerializeEnum!(auth_flavor);
DeserializeEnum!(auth_flavor);

/// Opaque authentication blob: a flavor plus mechanism-specific bytes.
#[derive(Clone, Debug, Default)]
pub struct opaque_auth {
    pub flavor: auth_flavor,
    pub body: Vec<u8>,
}
DeserializeStruct!(opaque_auth, flavor, body);
SerializeStruct!(opaque_auth, flavor, body);

/// The call header preceding procedure parameters. The transport parses
/// it and hands it to the dispatcher together with the parameter cursor.
#[derive(Clone, Debug, Default)]
pub struct call_body {
    /// RPC version; must be [`RPC_VERSION`].
    pub rpcvers: u32,
    /// Program number being called.
    pub prog: u32,
    /// Program version.
    pub vers: u32,
    /// Procedure number within the program.
    pub proc: u32,
    /// Caller credentials.
    pub cred: opaque_auth,
    /// Caller verifier.
    pub verf: opaque_auth,
}
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

/// Supported-version range reported on a program mismatch.
#[derive(Copy, Clone, Debug, Default)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}
DeserializeStruct!(mismatch_info, low, high);
SerializeStruct!(mismatch_info, low, high);

/// Outcome of an accepted call.
#[derive(Clone, Debug, Default)]
#[repr(u32)]
pub enum accept_body {
    /// Procedure executed; its results follow this header.
    #[default]
    SUCCESS,
    /// Program not served here.
    PROG_UNAVAIL,
    /// Program served, but not at the requested version.
    PROG_MISMATCH(mismatch_info),
    /// Procedure number unknown.
    PROC_UNAVAIL,
    /// Parameters could not be decoded.
    GARBAGE_ARGS,
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            accept_body::SUCCESS => 0_u32.serialize(dest),
            accept_body::PROG_UNAVAIL => 1_u32.serialize(dest),
            accept_body::PROG_MISMATCH(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
            accept_body::PROC_UNAVAIL => 3_u32.serialize(dest),
            accept_body::GARBAGE_ARGS => 4_u32.serialize(dest),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match deserialize::<u32>(src)? {
            0 => accept_body::SUCCESS,
            1 => accept_body::PROG_UNAVAIL,
            2 => accept_body::PROG_MISMATCH(deserialize(src)?),
            3 => accept_body::PROC_UNAVAIL,
            4 => accept_body::GARBAGE_ARGS,
            stat => return Err(invalid_data(format!("invalid accept_stat: {stat}"))),
        };
        Ok(())
    }
}

/// An accepted RPC reply: xid, the REPLY/MSG_ACCEPTED discriminants, a
/// server verifier, and the acceptance status. Procedure results are
/// written immediately after this header by the caller.
#[derive(Clone, Debug, Default)]
pub struct reply_msg {
    pub xid: u32,
    pub verf: opaque_auth,
    pub body: accept_body,
}

impl Serialize for reply_msg {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.xid.serialize(dest)?;
        // msg_type REPLY, reply_stat MSG_ACCEPTED
        1_u32.serialize(dest)?;
        0_u32.serialize(dest)?;
        self.verf.serialize(dest)?;
        self.body.serialize(dest)
    }
}

impl Deserialize for reply_msg {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.xid.deserialize(src)?;
        let msg_type = deserialize::<u32>(src)?;
        if msg_type != 1 {
            return Err(invalid_data(format!("not a reply message: {msg_type}")));
        }
        let reply_stat = deserialize::<u32>(src)?;
        if reply_stat != 0 {
            return Err(invalid_data(format!("reply not accepted: {reply_stat}")));
        }
        self.verf.deserialize(src)?;
        self.body.deserialize(src)
    }
}

/// Frames a successful reply; procedure results follow.
pub fn make_success_reply(xid: u32) -> reply_msg {
    reply_msg { xid, verf: opaque_auth::default(), body: accept_body::SUCCESS }
}

/// Reply for an unknown procedure number.
pub fn proc_unavail_reply(xid: u32) -> reply_msg {
    reply_msg { xid, verf: opaque_auth::default(), body: accept_body::PROC_UNAVAIL }
}

/// Reply for undecodable call parameters.
pub fn garbage_args_reply(xid: u32) -> reply_msg {
    reply_msg { xid, verf: opaque_auth::default(), body: accept_body::GARBAGE_ARGS }
}

/// Reply for a call at an unsupported program version.
pub fn prog_mismatch_reply(xid: u32, supported: u32) -> reply_msg {
    reply_msg {
        xid,
        verf: opaque_auth::default(),
        body: accept_body::PROG_MISMATCH(mismatch_info { low: supported, high: supported }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn success_reply_header_layout() {
        let mut buf = Vec::new();
        make_success_reply(0x1234).serialize(&mut buf).expect("serialize");
        // xid, REPLY, MSG_ACCEPTED, AUTH_NULL, zero-length body, SUCCESS
        assert_eq!(
            buf,
            [
                0x00, 0x00, 0x12, 0x34, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]
        );
    }

    #[test]
    fn reply_round_trip() {
        let mut buf = Vec::new();
        prog_mismatch_reply(7, 3).serialize(&mut buf).expect("serialize");
        let msg = deserialize::<reply_msg>(&mut Cursor::new(&buf)).expect("deserialize");
        assert_eq!(msg.xid, 7);
        match msg.body {
            accept_body::PROG_MISMATCH(info) => {
                assert_eq!(info.low, 3);
                assert_eq!(info.high, 3);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
