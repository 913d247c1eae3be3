// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Converter stream scenarios
//!
//! Short reads over an identity converter, a converter that needs many
//! calls before producing output, non-blocking reads re-armed through a
//! readiness source, and randomized read partitioning.

use std::thread;
use std::time::Duration;
use xstream::{
    pipe, ConvertOutcome, Converter, ConverterFlags, ConverterInputStream, ConverterResult, Error,
    IdentityConverter, MemoryInput, StreamConfig, INITIAL_BUFFER_SIZE,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_short_reads_over_identity() {
    init_logger();
    let stream = ConverterInputStream::with_config(
        MemoryInput::from_bytes(b"HELLO"),
        IdentityConverter,
        StreamConfig::default().with_initial_buffer_size(INITIAL_BUFFER_SIZE),
    );
    let mut collected = Vec::new();
    let mut dest = [0u8; 3];

    assert_eq!(stream.read(&mut dest, None).unwrap(), 3);
    collected.extend_from_slice(&dest[..3]);
    assert_eq!(stream.read(&mut dest, None).unwrap(), 2);
    collected.extend_from_slice(&dest[..2]);
    assert_eq!(stream.read(&mut dest, None).unwrap(), 0);

    assert_eq!(collected, b"HELLO");
}

/// Reports `PartialInput` for its first ten calls, then upper-cases the
/// whole input and finishes.
struct SlowUpper {
    calls: usize,
}

impl Converter for SlowUpper {
    fn convert(&mut self, input: &[u8], output: &mut [u8], _flags: ConverterFlags) -> xstream::Result<ConvertOutcome> {
        self.calls += 1;
        if self.calls <= 10 {
            return Err(Error::PartialInput);
        }
        if output.len() < input.len() {
            return Err(Error::NoSpace);
        }
        for (dst, src) in output.iter_mut().zip(input) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(ConvertOutcome::new(ConverterResult::Finished, input.len(), input.len()))
    }

    fn reset(&mut self) {
        self.calls = 0;
    }
}

#[test]
fn test_converter_needing_many_calls() {
    init_logger();
    let stream = ConverterInputStream::new(MemoryInput::from_bytes(b"abc"), SlowUpper { calls: 0 });
    let mut dest = [0u8; 16];

    assert_eq!(stream.read(&mut dest, None).unwrap(), 3);
    assert_eq!(&dest[..3], b"ABC");
    assert_eq!(stream.read(&mut dest, None).unwrap(), 0);
}

#[test]
fn test_nonblocking_read_rearmed_by_source() {
    init_logger();
    let (writer, reader) = pipe();
    let stream = ConverterInputStream::new(reader, IdentityConverter);
    assert!(stream.can_poll());
    let mut dest = [0u8; 8];

    assert!(matches!(stream.read_nonblocking(&mut dest), Err(Error::WouldBlock)));
    assert!(!stream.is_readable());

    let source = stream.create_source(None);
    assert!(!source.is_ready());
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        writer.write(b"x");
        writer.close();
    });
    assert!(source.wait(Some(Duration::from_secs(10))));
    producer.join().unwrap();

    assert!(stream.is_readable());
    assert_eq!(stream.read_nonblocking(&mut dest).unwrap(), 1);
    assert_eq!(dest[0], b'x');
    assert_eq!(stream.read_nonblocking(&mut dest).unwrap(), 0);
    source.destroy();
}

#[test]
fn test_readable_stream_source_fires_immediately() {
    let stream = ConverterInputStream::new(MemoryInput::from_bytes(b"ready"), IdentityConverter);
    let source = stream.create_source(None);
    assert!(source.is_ready());
    assert_eq!(source.name(), "converter");
}

#[test]
fn test_random_partitioning_round_trip() {
    init_logger();
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for round in 0..60 {
        let len = rng.usize(0..20_000);
        let data: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();

        let mut input = MemoryInput::new().with_read_limit(rng.usize(1..5000));
        let mut offset = 0;
        while offset < len {
            let end = (offset + rng.usize(1..3000)).min(len);
            input.add_bytes(&data[offset..end]);
            offset = end;
        }
        let config = StreamConfig::default().with_initial_buffer_size(rng.usize(1..8192));
        let stream = ConverterInputStream::with_config(input, IdentityConverter, config);

        let mut out = Vec::with_capacity(len);
        let mut buf = vec![0u8; 4096];
        let mut steps = 0;
        loop {
            let want = rng.usize(1..=buf.len());
            let n = stream.read(&mut buf[..want], None).unwrap();
            steps += 1;
            assert!(steps <= len + 1, "round {} did not terminate", round);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data, "round {}", round);
    }
}

#[test]
fn test_close_is_idempotent() {
    let stream = ConverterInputStream::new(MemoryInput::from_bytes(b"abc"), IdentityConverter);
    stream.close(None).unwrap();
    stream.close(None).unwrap();
    assert!(stream.is_closed());

    let mut buf = [0u8; 4];
    assert!(matches!(stream.read(&mut buf, None), Err(Error::Closed)));
    assert!(matches!(stream.skip(2, None), Err(Error::Closed)));
    let partial = stream.read_all(&mut buf, None).unwrap_err();
    assert_eq!(partial.bytes_read, 0);
    assert!(matches!(partial.error, Error::Closed));
    assert!(matches!(stream.read_async(4, None).wait(), Err(Error::Closed)));
}

#[test]
fn test_nonblocking_needs_pollable_base() {
    let stream = ConverterInputStream::new(xstream::ReaderInput::new(&b"plain"[..]), IdentityConverter);
    assert!(!stream.can_poll());
    assert!(matches!(stream.read_nonblocking(&mut [0u8; 4]), Err(Error::NotSupported(_))));
    assert_eq!(stream.read(&mut [0u8; 8], None).unwrap(), 5);
}

#[test]
fn test_chained_streams() {
    let inner = ConverterInputStream::new(MemoryInput::from_bytes(b"layered").with_read_limit(2), IdentityConverter);
    let outer = ConverterInputStream::new(inner, IdentityConverter);
    assert!(outer.can_poll());
    let mut buf = [0u8; 16];
    let n = outer.read_all(&mut buf, None).unwrap();
    assert_eq!(&buf[..n], b"layered");
    // Closing the outer stream closes the inner one.
    outer.close(None).unwrap();
    assert!(matches!(outer.base_stream(|b| b.read(&mut buf, true, None)), Err(Error::Closed)));
}
