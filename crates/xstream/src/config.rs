// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream tunables.
//!
//! Buffer sizing constants are shared by every stream; per-stream knobs live
//! in [`StreamConfig`].
//!
//! ```
//! use xstream::StreamConfig;
//!
//! let cfg = StreamConfig::default()
//!     .with_close_base_stream(false)
//!     .with_initial_buffer_size(512);
//! assert!(!cfg.close_base_stream);
//! ```

/// First allocation of the input and converted buffers.
pub const INITIAL_BUFFER_SIZE: usize = 4096;

/// Minimum number of bytes requested from upstream on a refill.
pub const REFILL_CHUNK: usize = 4096;

/// A buffer whose consumed prefix exceeds this is compacted instead of grown.
pub const COMPACT_THRESHOLD: usize = 256;

/// Scratch buffer size used by `skip`.
pub const SKIP_CHUNK_SIZE: usize = 8192;

/// Converter calls tolerated at end of input without any progress before
/// the stream gives up.
pub const END_OF_INPUT_RETRIES: usize = 16;

/// Per-stream configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Close the upstream when the converter stream is closed.
    pub close_base_stream: bool,
    /// Initial capacity of each internal buffer.
    pub initial_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            close_base_stream: true,
            initial_buffer_size: INITIAL_BUFFER_SIZE,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub fn with_close_base_stream(mut self, close: bool) -> Self {
        self.close_base_stream = close;
        self
    }

    /// Zero is bumped to 1.
    #[must_use]
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size.max(1);
        self
    }
}
