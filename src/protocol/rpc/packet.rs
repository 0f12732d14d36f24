//! Pooled request and reply buffers.
//!
//! A request is parsed through two distinct views: a read cursor over
//! the call parameters and a write cursor into a separate reply buffer,
//! so response building never aliases the bytes still being parsed.
//! Reply buffers are recycled through a lock-free pool; handlers that
//! project a response larger than their current buffer swap it for a
//! bigger pooled one with [`ReplyPacket::grow`].

use std::io::{Cursor, Write};

use crossbeam_queue::ArrayQueue;

/// Reply buffer handed out when the handler does not ask for more.
pub const DEFAULT_REPLY_SIZE: usize = 512;

/// Ceiling on any single reply allocation; client-supplied byte budgets
/// are clamped to it.
pub const MAX_REPLY_SIZE: usize = 1024 * 1024;

/// An incoming RPC request: the raw message bytes and the offset where
/// the procedure parameters start.
pub struct RpcPacket {
    data: Vec<u8>,
    params: usize,
}

impl RpcPacket {
    /// Wraps a received message whose parameters begin at `params`.
    pub fn new(data: Vec<u8>, params: usize) -> Self {
        let params = params.min(data.len());
        Self { data, params }
    }

    /// Wraps a buffer that contains only procedure parameters.
    pub fn from_params(data: Vec<u8>) -> Self {
        Self { data, params: 0 }
    }

    /// Read cursor positioned at the call parameters.
    pub fn params(&self) -> Cursor<&[u8]> {
        let mut cursor = Cursor::new(self.data.as_slice());
        cursor.set_position(self.params as u64);
        cursor
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Releases the underlying buffer, e.g. back to a receive pool.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// A reply being built in a pooled buffer.
///
/// The buffer appends through `Write` and tracks its allocation budget
/// in `limit`; budget-aware handlers (READDIR and friends) compare
/// [`len`](Self::len) against [`limit`](Self::limit) before committing
/// an entry. [`truncate`](Self::truncate) rewinds a partially built
/// payload so an error header can replace it.
pub struct ReplyPacket {
    buf: Vec<u8>,
    limit: usize,
}

impl ReplyPacket {
    fn with_buffer(mut buf: Vec<u8>, limit: usize) -> Self {
        buf.clear();
        buf.reserve(limit);
        Self { buf, limit }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The allocation budget this packet was taken with.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current write position, for a later [`truncate`](Self::truncate).
    pub fn mark(&self) -> usize {
        self.buf.len()
    }

    /// Discards everything written after `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    /// Ensures the packet can hold `limit` bytes, swapping in a larger
    /// pooled buffer (and carrying over what was written) if needed.
    pub fn grow(&mut self, pool: &PacketPool, limit: usize) {
        let limit = limit.min(MAX_REPLY_SIZE);
        if limit <= self.limit {
            return;
        }
        let mut bigger = pool.take_buffer(limit);
        bigger.extend_from_slice(&self.buf);
        let old = std::mem::replace(&mut self.buf, bigger);
        pool.return_buffer(old);
        self.limit = limit;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Write for ReplyPacket {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Recycler for reply buffers. Allocation never blocks: an empty pool
/// falls back to a fresh `Vec`, and buffers returned to a full pool are
/// dropped.
pub struct PacketPool {
    free: ArrayQueue<Vec<u8>>,
}

impl PacketPool {
    /// A pool retaining up to `slots` buffers.
    pub fn new(slots: usize) -> Self {
        Self { free: ArrayQueue::new(slots.max(1)) }
    }

    /// Takes a reply packet with at least `capacity` bytes of budget.
    /// The allocation is made on behalf of `request`; the transport's
    /// accounting ties the reply to the request it answers.
    pub fn allocate(&self, _request: &RpcPacket, capacity: usize) -> ReplyPacket {
        let capacity = capacity.clamp(DEFAULT_REPLY_SIZE, MAX_REPLY_SIZE);
        ReplyPacket::with_buffer(self.take_buffer(capacity), capacity)
    }

    /// Returns a finished packet's buffer to the pool.
    pub fn recycle(&self, packet: ReplyPacket) {
        self.return_buffer(packet.into_vec());
    }

    fn take_buffer(&self, capacity: usize) -> Vec<u8> {
        match self.free.pop() {
            Some(mut buf) => {
                buf.clear();
                buf.reserve(capacity);
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    fn return_buffer(&self, buf: Vec<u8>) {
        // A full queue just drops the buffer.
        let _ = self.free.push(buf);
    }
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new(64)
    }
}
