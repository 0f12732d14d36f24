//! NFS Harbor - an embeddable NFS version 3 request-processing engine.
//!
//! The crate implements the server-side machinery between an ONC-RPC
//! transport and a filesystem driver: procedure dispatch for the 22
//! NFS version 3 operations of RFC 1813, opaque file-handle resolution,
//! per-session open-file and directory-search state, and XDR response
//! framing.
//!
//! ## Main components
//!
//! - [`driver`]: the [`DiskDriver`](driver::DiskDriver) contract a
//!   storage backend implements to be exported, together with the data
//!   types it exchanges with the engine.
//!
//! - [`share`]: exported shares and the
//!   [`ShareRegistry`](share::ShareRegistry) that resolves the share id
//!   carried inside every file handle.
//!
//! - [`session`]: per-client [`Session`](session::Session) state - the
//!   open-file cache, the directory-search slot table, tree
//!   connections, and the per-request driver transaction.
//!
//! - [`cache`]: the file-id, open-file, and search-slot caches.
//!
//! - [`protocol`]: XDR encoding, pooled request/reply packets, the
//!   handle/attribute/cookie codecs, and the procedure handlers behind
//!   [`process_request`].
//!
//! ## Integration
//!
//! The transport owns sockets, RPC framing and authentication. For each
//! call it hands [`process_request`] the transaction id, the parsed
//! call header, an [`RpcPacket`](protocol::rpc::RpcPacket) positioned
//! at the procedure parameters, the client's session, the share
//! registry, and a reply [`PacketPool`](protocol::rpc::PacketPool); it
//! gets back the finished reply packet to put on the wire.
//!
//! ## Standards
//!
//! - RFC 1813: NFS Version 3 Protocol Specification
//! - RFC 5531: RPC: Remote Procedure Call Protocol, Version 2
//! - RFC 4506: XDR: External Data Representation Standard

pub mod cache;
pub mod driver;
pub mod protocol;
pub mod session;
pub mod share;

pub use protocol::nfs::v3::process_request;
pub use protocol::xdr;
