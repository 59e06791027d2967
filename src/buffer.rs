//! Growable byte buffer used by the response decoder.

pub(crate) const MIN_INCREMENT: usize = 256;
pub(crate) const MAX_INCREMENT: usize = 256 * 1024;
pub(crate) const INCREMENT_SLOP: usize = 16;

/// Byte buffer that grows in large steps to amortize reallocation across
/// the chunked reads of a single response.
///
/// A `ReadBuffer` is owned exclusively by one in-flight read. Once a frame
/// is complete, ownership moves into the produced
/// [`Response`](crate::Response); the caller can reclaim the buffer via
/// [`Response::into_buffer`](crate::Response::into_buffer) and hand it to
/// the next read.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    /// Backing storage. Bytes past `len` are spare room, kept zeroed so no
    /// unsafe code is needed for chunked reads.
    data: Vec<u8>,
    len: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Drops the valid bytes but keeps the allocation.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }

    /// Spare room currently available without growing.
    pub(crate) fn spare_len(&self) -> usize {
        self.data.len() - self.len
    }

    /// Ensures there is room for at least `needed` more bytes, growing per
    /// [`growth`] if necessary.
    pub(crate) fn reserve(&mut self, needed: usize) {
        if self.spare_len() < needed {
            let missing = needed - self.spare_len();
            let grow_by = growth(self.data.len(), missing);
            self.data.resize(self.data.len() + grow_by, 0);
        }
    }

    /// Writable spare room. Commit filled bytes with [`ReadBuffer::advance`].
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        if self.spare_len() == 0 {
            self.reserve(1);
        }
        let len = self.len;
        &mut self.data[len..]
    }

    /// Commits `count` bytes previously written into the spare room.
    pub(crate) fn advance(&mut self, count: usize) {
        debug_assert!(self.len + count <= self.data.len());
        self.len += count;
    }

    /// Appends a single byte.
    pub(crate) fn push(&mut self, byte: u8) {
        self.reserve(1);
        self.data[self.len] = byte;
        self.len += 1;
    }
}

/// Growth policy: how many bytes to add when `needed` more bytes of room
/// are missing at `capacity`.
///
/// Doubles the buffer, with the step clamped to
/// [`MIN_INCREMENT`]..=[`MAX_INCREMENT`]. A request larger than the step
/// is granted exactly, plus [`INCREMENT_SLOP`] so the short line that
/// typically follows a large literal does not force another growth.
pub(crate) fn growth(capacity: usize, needed: usize) -> usize {
    let increment = capacity.clamp(MIN_INCREMENT, MAX_INCREMENT);
    if increment < needed {
        needed + INCREMENT_SLOP
    } else {
        increment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_steps() {
        // Small buffers grow by the minimum increment.
        assert_eq!(growth(0, 1), MIN_INCREMENT);
        assert_eq!(growth(100, 1), MIN_INCREMENT);
        // Mid-size buffers double.
        assert_eq!(growth(1024, 1), 1024);
        assert_eq!(growth(8192, 100), 8192);
        // The doubling step is capped.
        assert_eq!(growth(1024 * 1024, 1), MAX_INCREMENT);
        // An oversized request is granted exactly, plus slop.
        assert_eq!(growth(256, 4096), 4096 + INCREMENT_SLOP);
        assert_eq!(growth(MAX_INCREMENT, MAX_INCREMENT + 1), MAX_INCREMENT + 1 + INCREMENT_SLOP);
    }

    #[test]
    fn push_and_reserve() {
        let mut buffer = ReadBuffer::new();
        assert!(buffer.is_empty());

        for byte in b"hello" {
            buffer.push(*byte);
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.as_slice(), b"hello");

        buffer.reserve(10_000);
        assert!(buffer.spare_len() >= 10_000);
        assert_eq!(buffer.as_slice(), b"hello");
    }

    #[test]
    fn advance_commits_spare_bytes() {
        let mut buffer = ReadBuffer::with_capacity(16);
        let spare = buffer.spare_mut();
        spare[..3].copy_from_slice(b"abc");
        buffer.advance(3);

        assert_eq!(buffer.as_slice(), b"abc");
        assert_eq!(buffer.into_vec(), b"abc".to_vec());
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut buffer = ReadBuffer::with_capacity(64);
        buffer.push(b'x');
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.spare_len(), 64);
    }
}
