//! Batches a byte stream into numbered parts
//!
//! Bytes accumulate until the buffer reaches the flush threshold; the whole
//! buffer then becomes one part. Whatever remains when the source ends is the
//! final part, whatever its size. A source that produced no part at all still
//! yields one (possibly empty) final part.

use bytes::{Bytes, BytesMut};

/// A part ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPart {
    pub part_number: u32,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct PartBuffer {
    buffer: BytesMut,
    threshold: usize,
    next_part: u32,
}

impl PartBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            threshold: threshold.max(1),
            next_part: 1,
        }
    }

    /// Append a chunk; returns a part if the threshold was reached.
    pub fn push(&mut self, chunk: &[u8]) -> Option<PendingPart> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() >= self.threshold {
            Some(self.take())
        } else {
            None
        }
    }

    /// Flush the remainder once the source is exhausted.
    pub fn finish(&mut self) -> Option<PendingPart> {
        if !self.buffer.is_empty() || self.next_part == 1 {
            Some(self.take())
        } else {
            None
        }
    }

    fn take(&mut self) -> PendingPart {
        let part = PendingPart {
            part_number: self.next_part,
            data: self.buffer.split().freeze(),
        };
        self.next_part += 1;
        part
    }

    /// Bytes buffered and not yet flushed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of parts emitted so far
    pub fn parts_emitted(&self) -> u32 {
        self.next_part - 1
    }
}
