//! Ordered queue of byte chunks owned by one stream
//!
//! The transfer driver appends at the back, the consumer drains from the
//! front.  All access happens under the owning stream's lock.

use std::collections::VecDeque;

use bytes::Bytes;

/// One chunk of bytes received from the network, tracking how much of it
/// has already been consumed.
#[derive(Debug)]
pub struct Chunk {
    data: Bytes,
    consumed: usize,
}

impl Chunk {
    pub fn new(data: Bytes) -> Self {
        Self { data, consumed: 0 }
    }

    /// The not-yet-consumed part of the payload.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    /// Number of bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.data.len() - self.consumed
    }

    /// Size of the payload, including the consumed prefix.
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Mark `n` bytes as consumed.
    ///
    /// Returns false when the chunk is now empty and should be popped by
    /// its owner.
    pub fn consume(&mut self, n: usize) -> bool {
        debug_assert!(self.consumed + n <= self.data.len());
        self.consumed += n;
        self.consumed < self.data.len()
    }

    /// Copy `dest.len()` bytes into `dest` and consume them.  The caller
    /// must not request more than [`Chunk::available`].
    ///
    /// Returns false when the chunk is now empty.
    pub fn read(&mut self, dest: &mut [u8]) -> bool {
        let n = dest.len();
        dest.copy_from_slice(&self.data[self.consumed..self.consumed + n]);
        self.consume(n)
    }
}

/// FIFO of chunks with O(1) append, O(1) front-consume and O(1) size
/// accounting.
///
/// Only the front chunk may be partially consumed.  The running total
/// counts the full size of every queued chunk, consumed prefixes included;
/// it drops only when a chunk is popped.  The pause threshold is measured
/// against this total.
#[derive(Debug, Default)]
pub struct BufferQueue {
    chunks: VecDeque<Chunk>,
    total: usize,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: Bytes) {
        self.total += data.len();
        self.chunks.push_back(Chunk::new(data));
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of the total sizes of all queued chunks.
    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn front_mut(&mut self) -> Option<&mut Chunk> {
        self.chunks.front_mut()
    }

    pub fn pop_front(&mut self) {
        if let Some(chunk) = self.chunks.pop_front() {
            self.total -= chunk.total_size();
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Chunk ---

    #[test]
    fn chunk_consume_partial_then_empty() {
        let mut chunk = Chunk::new(Bytes::from_static(b"hello"));
        assert_eq!(chunk.available(), 5);
        assert_eq!(chunk.total_size(), 5);

        assert!(chunk.consume(2));
        assert_eq!(chunk.available(), 3);
        assert_eq!(chunk.remaining(), b"llo");
        assert_eq!(chunk.total_size(), 5);

        assert!(!chunk.consume(3));
        assert_eq!(chunk.available(), 0);
    }

    #[test]
    fn chunk_read_copies_and_consumes() {
        let mut chunk = Chunk::new(Bytes::from_static(b"abcdef"));

        let mut buf = [0u8; 4];
        assert!(chunk.read(&mut buf));
        assert_eq!(&buf, b"abcd");
        assert_eq!(chunk.remaining(), b"ef");

        let mut rest = [0u8; 2];
        assert!(!chunk.read(&mut rest));
        assert_eq!(&rest, b"ef");
    }

    // --- BufferQueue ---

    #[test]
    fn queue_push_and_drain_in_order() {
        let mut queue = BufferQueue::new();
        queue.push(Bytes::from_static(b"ab"));
        queue.push(Bytes::from_static(b"cd"));
        assert_eq!(queue.total_size(), 4);

        let mut out = Vec::new();
        while let Some(front) = queue.front_mut() {
            out.extend_from_slice(front.remaining());
            let n = front.available();
            if !front.consume(n) {
                queue.pop_front();
            }
        }
        assert_eq!(out, b"abcd");
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0);
    }

    #[test]
    fn total_includes_consumed_prefix_until_pop() {
        let mut queue = BufferQueue::new();
        queue.push(Bytes::from_static(b"abcdef"));

        let front = queue.front_mut().unwrap();
        assert!(front.consume(4));
        // the consumed prefix still counts until the chunk is popped
        assert_eq!(queue.total_size(), 6);

        let front = queue.front_mut().unwrap();
        assert!(!front.consume(2));
        queue.pop_front();
        assert_eq!(queue.total_size(), 0);
    }

    #[test]
    fn clear_resets_total() {
        let mut queue = BufferQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.push(Bytes::from_static(b"def"));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0);
    }

    #[test]
    fn pop_on_empty_queue_is_harmless() {
        let mut queue = BufferQueue::new();
        queue.pop_front();
        assert!(queue.is_empty());
        assert_eq!(queue.total_size(), 0);
    }
}
