// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deflate converters over `flate2`'s streaming `Compress`/`Decompress`.
//!
//! ```
//! use xstream::{Converter, ConverterFlags, ConverterResult, ZlibCompressor, ZlibDecompressor, ZlibFormat};
//!
//! let mut packed = vec![0u8; 256];
//! let mut c = ZlibCompressor::new(ZlibFormat::Zlib, Default::default());
//! let o = c.convert(b"hello hello hello", &mut packed, ConverterFlags::INPUT_AT_END)?;
//! assert_eq!(o.result, ConverterResult::Finished);
//!
//! let mut plain = vec![0u8; 64];
//! let mut d = ZlibDecompressor::new(ZlibFormat::Zlib);
//! let o2 = d.convert(&packed[..o.bytes_written], &mut plain, ConverterFlags::INPUT_AT_END)?;
//! assert_eq!(&plain[..o2.bytes_written], b"hello hello hello");
//! # Ok::<(), xstream::Error>(())
//! ```

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::converter::{ConvertOutcome, Converter, ConverterFlags, ConverterResult};
use crate::error::{Error, Result};

/// Framing of the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZlibFormat {
    /// RFC 1950 header and Adler-32 trailer.
    #[default]
    Zlib,
    /// Bare RFC 1951 deflate.
    Raw,
}

impl ZlibFormat {
    fn zlib_header(self) -> bool {
        matches!(self, ZlibFormat::Zlib)
    }
}

/// Map a finished `flate2` call onto the converter contract.
fn outcome(status: Status, flags: ConverterFlags, bytes_read: usize, bytes_written: usize) -> Result<ConvertOutcome> {
    match status {
        // No progress possible with the output space given.
        Status::BufError => {
            if flags.contains(ConverterFlags::FLUSH) {
                Ok(ConvertOutcome::new(ConverterResult::Flushed, 0, 0))
            } else {
                Err(Error::PartialInput)
            }
        }
        Status::StreamEnd => Ok(ConvertOutcome::new(ConverterResult::Finished, bytes_read, bytes_written)),
        Status::Ok => Ok(ConvertOutcome::new(ConverterResult::Converted, bytes_read, bytes_written)),
    }
}

fn delta(after: u64, before: u64) -> usize {
    usize::try_from(after - before).unwrap_or(usize::MAX)
}

/// Deflate compressor.
#[derive(Debug)]
pub struct ZlibCompressor {
    stream: Compress,
    format: ZlibFormat,
    level: Compression,
}

impl ZlibCompressor {
    #[must_use]
    pub fn new(format: ZlibFormat, level: Compression) -> Self {
        Self {
            stream: Compress::new(level, format.zlib_header()),
            format,
            level,
        }
    }

    #[must_use]
    pub fn format(&self) -> ZlibFormat {
        self.format
    }

    #[must_use]
    pub fn level(&self) -> Compression {
        self.level
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new(ZlibFormat::Zlib, Compression::default())
    }
}

impl Converter for ZlibCompressor {
    fn convert(&mut self, input: &[u8], output: &mut [u8], flags: ConverterFlags) -> Result<ConvertOutcome> {
        if output.is_empty() {
            return Err(Error::NoSpace);
        }
        let flush = if flags.contains(ConverterFlags::INPUT_AT_END) {
            FlushCompress::Finish
        } else if flags.contains(ConverterFlags::FLUSH) {
            FlushCompress::Sync
        } else {
            FlushCompress::None
        };

        let (in_before, out_before) = (self.stream.total_in(), self.stream.total_out());
        let status = self
            .stream
            .compress(input, output, flush)
            .map_err(|e| Error::Failed(format!("internal compressor error: {e}")))?;
        let bytes_read = delta(self.stream.total_in(), in_before);
        let bytes_written = delta(self.stream.total_out(), out_before);
        outcome(status, flags, bytes_read, bytes_written)
    }

    fn reset(&mut self) {
        self.stream.reset();
    }
}

/// Deflate decompressor.
#[derive(Debug)]
pub struct ZlibDecompressor {
    stream: Decompress,
    format: ZlibFormat,
}

impl ZlibDecompressor {
    #[must_use]
    pub fn new(format: ZlibFormat) -> Self {
        Self {
            stream: Decompress::new(format.zlib_header()),
            format,
        }
    }

    #[must_use]
    pub fn format(&self) -> ZlibFormat {
        self.format
    }
}

impl Default for ZlibDecompressor {
    fn default() -> Self {
        Self::new(ZlibFormat::Zlib)
    }
}

impl Converter for ZlibDecompressor {
    fn convert(&mut self, input: &[u8], output: &mut [u8], flags: ConverterFlags) -> Result<ConvertOutcome> {
        if output.is_empty() {
            return Err(Error::NoSpace);
        }
        let (in_before, out_before) = (self.stream.total_in(), self.stream.total_out());
        let status = self
            .stream
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| {
                if e.needs_dictionary().is_some() {
                    Error::InvalidData("compressed data needs a preset dictionary".to_string())
                } else {
                    Error::InvalidData(format!("invalid compressed data: {e}"))
                }
            })?;
        let bytes_read = delta(self.stream.total_in(), in_before);
        let bytes_written = delta(self.stream.total_out(), out_before);
        outcome(status, flags, bytes_read, bytes_written)
    }

    fn reset(&mut self) {
        self.stream.reset(self.format.zlib_header());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress_all(c: &mut ZlibCompressor, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; data.len() + 128];
        let o = c.convert(data, &mut out, ConverterFlags::INPUT_AT_END).unwrap();
        assert_eq!(o.result, ConverterResult::Finished);
        assert_eq!(o.bytes_read, data.len());
        out.truncate(o.bytes_written);
        out
    }

    #[test]
    fn test_compress_then_decompress_both_formats() {
        let data: Vec<u8> = (0..2000u32).map(|i| (i % 17) as u8).collect();
        for format in [ZlibFormat::Zlib, ZlibFormat::Raw] {
            let packed = compress_all(&mut ZlibCompressor::new(format, Compression::best()), &data);
            assert!(packed.len() < data.len());
            let mut out = vec![0u8; data.len()];
            let mut d = ZlibDecompressor::new(format);
            let o = d.convert(&packed, &mut out, ConverterFlags::INPUT_AT_END).unwrap();
            assert_eq!(o.result, ConverterResult::Finished);
            assert_eq!(o.bytes_written, data.len());
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_corrupt_input_is_invalid_data() {
        let mut d = ZlibDecompressor::default();
        let mut out = [0u8; 64];
        let err = d
            .convert(b"this is not deflate data", &mut out, ConverterFlags::NONE)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_empty_output_is_no_space() {
        let mut c = ZlibCompressor::default();
        assert!(matches!(c.convert(b"abc", &mut [], ConverterFlags::NONE), Err(Error::NoSpace)));
    }

    #[test]
    fn test_truncated_stream_needs_input() {
        let packed = compress_all(&mut ZlibCompressor::default(), b"some text to squeeze, some text to squeeze");
        let mut d = ZlibDecompressor::default();
        let mut out = [0u8; 256];
        let half = packed.len() / 2;
        let o = d.convert(&packed[..half], &mut out, ConverterFlags::NONE).unwrap();
        assert_eq!(o.result, ConverterResult::Converted);
        assert!(o.bytes_read > 0);
        // Nothing left to consume.
        assert!(matches!(d.convert(&[], &mut out, ConverterFlags::NONE), Err(Error::PartialInput)));
    }

    #[test]
    fn test_reset_starts_new_stream() {
        let mut c = ZlibCompressor::default();
        let first = compress_all(&mut c, b"abcabcabc");
        c.reset();
        let second = compress_all(&mut c, b"abcabcabc");
        assert_eq!(first, second);
    }
}
