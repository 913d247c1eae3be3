// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Growable byte window used for the input and converted buffers.
//!
//! ```text
//! 0        start           end              size
//! |consumed| readable data | tailspace      |
//! ```
//!
//! The backing storage is allocated lazily; the first growth uses the
//! configured initial size and every later one doubles it.

use crate::config::COMPACT_THRESHOLD;

#[derive(Debug)]
pub(crate) struct Buffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
    initial_size: usize,
}

impl Buffer {
    pub(crate) fn new(initial_size: usize) -> Self {
        Self {
            data: Vec::new(),
            start: 0,
            end: 0,
            initial_size: initial_size.max(1),
        }
    }

    /// Allocated size.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.data.len()
    }

    /// Readable bytes.
    #[inline]
    pub(crate) fn data_size(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Writable bytes after `end`.
    #[inline]
    pub(crate) fn tailspace(&self) -> usize {
        self.data.len() - self.end
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Tailspace, to be followed by [`Buffer::commit`].
    #[inline]
    pub(crate) fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Publish `n` bytes written into [`Buffer::writable`].
    #[inline]
    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.tailspace());
        self.end += n;
    }

    /// Drop `n` readable bytes. An emptied buffer rewinds to offset 0.
    pub(crate) fn consumed(&mut self, n: usize) {
        debug_assert!(n <= self.data_size());
        self.start += n;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Move up to `dest.len()` readable bytes into `dest`.
    pub(crate) fn read_into(&mut self, dest: &mut [u8]) -> usize {
        let n = dest.len().min(self.data_size());
        dest[..n].copy_from_slice(&self.data[self.start..self.start + n]);
        self.consumed(n);
        n
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.data.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    fn grow(&mut self) {
        let size = if self.data.is_empty() {
            self.initial_size
        } else {
            self.data.len() * 2
        };
        let mut data = vec![0u8; size];
        let in_buffer = self.data_size();
        data[..in_buffer].copy_from_slice(self.data());
        self.data = data;
        self.end = in_buffer;
        self.start = 0;
    }

    /// Make room for `at_least` bytes counting the data already held.
    pub(crate) fn ensure_space(&mut self, at_least: usize) {
        let in_buffer = self.data_size();
        if in_buffer >= at_least {
            return;
        }
        if in_buffer + self.tailspace() >= at_least {
            // Fits at the end; small copies are compacted anyway.
            if in_buffer < COMPACT_THRESHOLD {
                self.compact();
            }
        } else if self.size() >= at_least {
            self.compact();
        } else {
            while self.size() < at_least {
                self.grow();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(initial: usize, bytes: &[u8]) -> Buffer {
        let mut buf = Buffer::new(initial);
        buf.ensure_space(bytes.len());
        buf.writable()[..bytes.len()].copy_from_slice(bytes);
        buf.commit(bytes.len());
        buf
    }

    #[test]
    fn test_lazy_allocation_and_doubling() {
        let mut buf = Buffer::new(16);
        assert_eq!(buf.size(), 0);
        buf.ensure_space(1);
        assert_eq!(buf.size(), 16);
        buf.ensure_space(40);
        assert_eq!(buf.size(), 64);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_into_and_rewind() {
        let mut buf = filled(8, b"HELLO");
        let mut out = [0u8; 3];
        assert_eq!(buf.read_into(&mut out), 3);
        assert_eq!(&out, b"HEL");
        assert_eq!(buf.data(), b"LO");
        assert_eq!(buf.read_into(&mut out), 2);
        assert_eq!(&out[..2], b"LO");
        assert_eq!(buf.data_size(), 0);
        assert_eq!(buf.tailspace(), 8);
    }

    #[test]
    fn test_ensure_space_compacts_before_growing() {
        let mut buf = filled(8, b"abcdefgh");
        buf.consumed(6);
        assert_eq!(buf.tailspace(), 0);
        // 2 held + 6 wanted fits once compacted.
        buf.ensure_space(8);
        assert_eq!(buf.size(), 8);
        assert_eq!(buf.data(), b"gh");
        assert_eq!(buf.tailspace(), 6);
    }

    #[test]
    fn test_growth_keeps_data() {
        let mut buf = filled(4, b"wxyz");
        buf.consumed(1);
        buf.ensure_space(10);
        assert_eq!(buf.size(), 16);
        assert_eq!(buf.data(), b"xyz");
        assert!(buf.tailspace() >= 7);
    }

    #[test]
    fn test_large_resident_data_not_compacted() {
        let payload = vec![7u8; COMPACT_THRESHOLD + 10];
        let mut buf = filled(1024, &payload);
        buf.consumed(1);
        let before = buf.tailspace();
        buf.ensure_space(COMPACT_THRESHOLD + 20);
        assert_eq!(buf.tailspace(), before);
        assert_eq!(buf.data_size(), COMPACT_THRESHOLD + 9);
    }
}
