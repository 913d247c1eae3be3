// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # xstream - Pollable Converter Streams
//!
//! Input streams that pull bytes from an upstream source and push them
//! through a stateful [`Converter`] (identity, deflate, or your own), with
//! blocking and non-blocking reads, cancellation and readiness sources.
//!
//! ## Quick Start
//!
//! ```rust
//! use xstream::{ConverterInputStream, MemoryInput, ZlibCompressor, ZlibDecompressor, ZlibFormat};
//!
//! let packed = ConverterInputStream::new(
//!     MemoryInput::from_bytes(b"squeeze me, squeeze me, squeeze me"),
//!     ZlibCompressor::default(),
//! );
//! let unpacked = ConverterInputStream::new(packed, ZlibDecompressor::new(ZlibFormat::Zlib));
//!
//! let mut buf = [0u8; 64];
//! let n = unpacked.read_all(&mut buf, None).map_err(|p| p.error)?;
//! assert_eq!(&buf[..n], b"squeeze me, squeeze me, squeeze me");
//! # Ok::<(), xstream::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  ConverterInputStream (read / read_nonblocking / async / skip) |
//! +---------------------------------------------------------------+
//! |  input buffer  -->  Converter  -->  converted buffer          |
//! +---------------------------------------------------------------+
//! |  PollableInput (memory, pipe, io::Read, chained streams)      |
//! +---------------------------------------------------------------+
//! |  Cancellable  |  Source tree  |  crossbeam async completion   |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`converter_stream`] - the converter input stream
//! - [`converter`] / [`zlib`] - converter contract and implementations
//! - [`upstream`] - byte sources
//! - [`cancel`] / [`source`] - cancellation and readiness

mod buffer;
/// Cancellation tokens.
pub mod cancel;
/// Buffer sizing and per-stream options.
pub mod config;
/// Converter contract and the identity converter.
pub mod converter;
/// Stream over a converter.
pub mod converter_stream;
/// Error type and boundary codes.
pub mod error;
/// Readiness sources.
pub mod source;
/// Upstream byte sources.
pub mod upstream;
/// Deflate converters.
pub mod zlib;

pub use cancel::{Cancellable, CurrentGuard, HandlerId};
pub use config::{StreamConfig, INITIAL_BUFFER_SIZE, SKIP_CHUNK_SIZE};
pub use converter::{ConvertOutcome, Converter, ConverterFlags, ConverterResult, IdentityConverter};
pub use converter_stream::{AsyncOp, ConverterInputStream};
pub use error::{Error, PartialRead, Result};
pub use flate2::Compression;
pub use source::{pollable_source, Source, SourceNotifier};
pub use upstream::{pipe, MemoryInput, PipeInput, PipeWriter, PollableInput, ReaderInput};
pub use zlib::{ZlibCompressor, ZlibDecompressor, ZlibFormat};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
