// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte converters.
//!
//! A [`Converter`] is a stateful transducer. Each call consumes a prefix of
//! `input` and fills a prefix of `output`. Besides real failures it reports
//! two buffer requests as errors:
//!
//! - [`Error::PartialInput`]: nothing can be produced until more input is
//!   supplied (never returned with [`ConverterFlags::INPUT_AT_END`] by a
//!   well-behaved converter).
//! - [`Error::NoSpace`]: `output` is too small for the next unit of output.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::error::{Error, Result};

/// Flags passed to [`Converter::convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ConverterFlags(u32);

impl ConverterFlags {
    pub const NONE: ConverterFlags = ConverterFlags(0);
    /// No input follows the bytes passed in this call.
    pub const INPUT_AT_END: ConverterFlags = ConverterFlags(1 << 0);
    /// Emit everything derivable from the input so far.
    pub const FLUSH: ConverterFlags = ConverterFlags(1 << 1);

    #[inline]
    #[must_use]
    pub const fn contains(self, other: ConverterFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for ConverterFlags {
    type Output = ConverterFlags;

    fn bitor(self, rhs: ConverterFlags) -> ConverterFlags {
        ConverterFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConverterFlags {
    fn bitor_assign(&mut self, rhs: ConverterFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ConverterFlags {
    type Output = ConverterFlags;

    fn bitand(self, rhs: ConverterFlags) -> ConverterFlags {
        ConverterFlags(self.0 & rhs.0)
    }
}

/// Successful conversion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterResult {
    /// Some progress was made.
    Converted,
    /// All input consumed and all output produced; no further calls.
    Finished,
    /// A [`ConverterFlags::FLUSH`] request completed.
    Flushed,
}

/// Outcome of one [`Converter::convert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOutcome {
    pub result: ConverterResult,
    pub bytes_read: usize,
    pub bytes_written: usize,
}

impl ConvertOutcome {
    #[inline]
    #[must_use]
    pub fn new(result: ConverterResult, bytes_read: usize, bytes_written: usize) -> Self {
        Self {
            result,
            bytes_read,
            bytes_written,
        }
    }

    /// Neither side moved.
    #[inline]
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.bytes_read == 0 && self.bytes_written == 0
    }
}

/// Stateful byte-in, byte-out transducer.
pub trait Converter: Send {
    /// Convert a prefix of `input` into a prefix of `output`.
    fn convert(&mut self, input: &[u8], output: &mut [u8], flags: ConverterFlags) -> Result<ConvertOutcome>;

    /// Return to the initial state, dropping any buffered data.
    fn reset(&mut self);
}

impl<C: Converter + ?Sized> Converter for Box<C> {
    fn convert(&mut self, input: &[u8], output: &mut [u8], flags: ConverterFlags) -> Result<ConvertOutcome> {
        (**self).convert(input, output, flags)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Copies input to output unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl IdentityConverter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Converter for IdentityConverter {
    fn convert(&mut self, input: &[u8], output: &mut [u8], flags: ConverterFlags) -> Result<ConvertOutcome> {
        if output.is_empty() && !input.is_empty() {
            return Err(Error::NoSpace);
        }
        if input.is_empty() && !flags.contains(ConverterFlags::INPUT_AT_END) {
            if flags.contains(ConverterFlags::FLUSH) {
                return Ok(ConvertOutcome::new(ConverterResult::Flushed, 0, 0));
            }
            return Err(Error::PartialInput);
        }

        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);

        let result = if n == input.len() && flags.contains(ConverterFlags::INPUT_AT_END) {
            ConverterResult::Finished
        } else if n == input.len() && flags.contains(ConverterFlags::FLUSH) {
            ConverterResult::Flushed
        } else {
            ConverterResult::Converted
        };
        Ok(ConvertOutcome::new(result, n, n))
    }

    fn reset(&mut self) {}
}
