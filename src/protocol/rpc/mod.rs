//! Request/reply packet plumbing between the transport and the
//! procedure handlers.
//!
//! The transport hands the dispatcher an [`RpcPacket`] positioned at
//! the call parameters; handlers build their response in a
//! [`ReplyPacket`] borrowed from the [`PacketPool`] and ownership of
//! the finished reply transfers back to the transport.

mod packet;

pub use packet::{PacketPool, ReplyPacket, RpcPacket, DEFAULT_REPLY_SIZE, MAX_REPLY_SIZE};
