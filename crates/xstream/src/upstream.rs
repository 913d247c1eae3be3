// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Upstream byte sources.
//!
//! [`PollableInput`] is what a converter stream pulls from. Three
//! implementations ship with the crate:
//!
//! - [`MemoryInput`]: queued in-memory chunks, always readable.
//! - [`pipe`]: a writer/reader pair; blocking reads wait for the writer,
//!   non-blocking reads return [`Error::WouldBlock`].
//! - [`ReaderInput`]: blocking-only adapter over any [`std::io::Read`].

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;

use crate::cancel::{Cancellable, HandlerId};
use crate::error::{Error, Result};
use crate::source::{pollable_source, Source, SourceNotifier};

/// Byte source consumed by a converter stream.
pub trait PollableInput: Send {
    /// Read into `buf`. Returns 0 at end of stream.
    ///
    /// With `blocking == false` an implementation that has no data must
    /// return [`Error::WouldBlock`] instead of waiting.
    fn read(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize>;

    /// Whether non-blocking reads and sources are supported.
    fn can_poll(&self) -> bool {
        false
    }

    /// Whether a non-blocking read would make progress (data or EOF).
    fn is_readable(&self) -> bool {
        true
    }

    /// Source that fires when [`PollableInput::is_readable`] may have
    /// become true.
    fn create_source(&self, cancel: Option<&Cancellable>) -> Source {
        pollable_source("pollable", Source::ready("readable"), cancel)
    }

    fn close(&mut self, _cancel: Option<&Cancellable>) -> Result<()> {
        Ok(())
    }
}

impl<P: PollableInput + ?Sized> PollableInput for Box<P> {
    fn read(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        (**self).read(buf, blocking, cancel)
    }

    fn can_poll(&self) -> bool {
        (**self).can_poll()
    }

    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }

    fn create_source(&self, cancel: Option<&Cancellable>) -> Source {
        (**self).create_source(cancel)
    }

    fn close(&mut self, cancel: Option<&Cancellable>) -> Result<()> {
        (**self).close(cancel)
    }
}

// ============================================================================
// MemoryInput
// ============================================================================

/// In-memory upstream.
///
/// ```
/// use xstream::{MemoryInput, PollableInput};
///
/// let mut input = MemoryInput::from_bytes(b"HELLO").with_read_limit(2);
/// let mut buf = [0u8; 8];
/// assert_eq!(input.read(&mut buf, true, None)?, 2);
/// assert_eq!(&buf[..2], b"HE");
/// # Ok::<(), xstream::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryInput {
    chunks: VecDeque<Vec<u8>>,
    read_limit: Option<usize>,
    closed: bool,
}

impl MemoryInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut input = Self::new();
        input.add_bytes(bytes);
        input
    }

    /// Queue another chunk. Reads never cross a chunk boundary.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.chunks.push_back(bytes.to_vec());
        }
    }

    /// Cap every read at `limit` bytes.
    #[must_use]
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit.max(1));
        self
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

impl PollableInput for MemoryInput {
    fn read(&mut self, buf: &mut [u8], _blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        if self.closed {
            return Err(Error::Closed);
        }
        if let Some(cancel) = cancel {
            cancel.set_error_if_cancelled()?;
        }
        let Some(front) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = buf.len().min(front.len()).min(self.read_limit.unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&front[..n]);
        if n == front.len() {
            self.chunks.pop_front();
        } else {
            front.drain(..n);
        }
        Ok(n)
    }

    fn can_poll(&self) -> bool {
        true
    }

    fn close(&mut self, _cancel: Option<&Cancellable>) -> Result<()> {
        self.closed = true;
        self.chunks.clear();
        Ok(())
    }
}

// ============================================================================
// Pipe
// ============================================================================

#[derive(Debug, Default)]
struct PipeState {
    data: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

#[derive(Debug, Default)]
struct Pipe {
    state: Mutex<PipeState>,
    condvar: Condvar,
    notifiers: Mutex<Vec<SourceNotifier>>,
}

impl Pipe {
    /// Wake blocked readers and readiness sources.
    fn signal(&self) {
        self.condvar.notify_all();
        let notifiers = {
            let mut notifiers = self.notifiers.lock();
            notifiers.retain(SourceNotifier::is_alive);
            notifiers.clone()
        };
        for notifier in notifiers {
            notifier.wake();
        }
    }
}

/// Create a connected pipe.
///
/// ```
/// use xstream::{pipe, PollableInput, Error};
///
/// let (mut writer, mut reader) = pipe();
/// let mut buf = [0u8; 4];
/// assert!(matches!(reader.read(&mut buf, false, None), Err(Error::WouldBlock)));
/// writer.write(b"hi");
/// writer.close();
/// assert_eq!(reader.read(&mut buf, false, None)?, 2);
/// assert_eq!(reader.read(&mut buf, false, None)?, 0);
/// # Ok::<(), xstream::Error>(())
/// ```
#[must_use]
pub fn pipe() -> (PipeWriter, PipeInput) {
    let shared = Arc::new(Pipe::default());
    (
        PipeWriter {
            pipe: Arc::clone(&shared),
        },
        PipeInput { pipe: shared },
    )
}

/// Writing end of [`pipe`]. Dropping it closes the pipe.
#[derive(Debug)]
pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

impl PipeWriter {
    /// Append bytes. Returns `false` when the reader is gone or the writer
    /// was closed.
    pub fn write(&self, bytes: &[u8]) -> bool {
        {
            let mut state = self.pipe.state.lock();
            if state.writer_closed || state.reader_closed {
                return false;
            }
            state.data.extend(bytes);
        }
        self.pipe.signal();
        true
    }

    /// Mark end of stream. Readers see 0 once the data is drained.
    pub fn close(&self) {
        {
            let mut state = self.pipe.state.lock();
            if state.writer_closed {
                return;
            }
            state.writer_closed = true;
        }
        self.pipe.signal();
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if PipeWriter::write(self, buf) {
            Ok(buf.len())
        } else {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reading end of [`pipe`].
#[derive(Debug)]
pub struct PipeInput {
    pipe: Arc<Pipe>,
}

/// Disconnects a cancel handler on drop.
struct HandlerGuard<'a> {
    cancel: &'a Cancellable,
    id: Option<HandlerId>,
}

impl Drop for HandlerGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.cancel.disconnect(id);
        }
    }
}

impl PollableInput for PipeInput {
    fn read(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        // Connected before taking the state lock: an already cancelled token
        // runs the handler inline.
        let _handler = match (blocking, cancel) {
            (true, Some(cancel)) => {
                let pipe = Arc::clone(&self.pipe);
                let id = cancel.connect(move || {
                    let _state = pipe.state.lock();
                    pipe.condvar.notify_all();
                });
                Some(HandlerGuard { cancel, id })
            }
            _ => None,
        };

        let mut state = self.pipe.state.lock();
        loop {
            if state.reader_closed {
                return Err(Error::Closed);
            }
            if let Some(cancel) = cancel {
                cancel.set_error_if_cancelled()?;
            }
            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *dst = src;
                }
                return Ok(n);
            }
            if state.writer_closed {
                return Ok(0);
            }
            if !blocking {
                return Err(Error::WouldBlock);
            }
            self.pipe.condvar.wait(&mut state);
        }
    }

    fn can_poll(&self) -> bool {
        true
    }

    fn is_readable(&self) -> bool {
        let state = self.pipe.state.lock();
        !state.data.is_empty() || state.writer_closed || state.reader_closed
    }

    fn create_source(&self, cancel: Option<&Cancellable>) -> Source {
        let pipe = Arc::clone(&self.pipe);
        let child = Source::from_predicate("pipe", move || {
            let state = pipe.state.lock();
            !state.data.is_empty() || state.writer_closed || state.reader_closed
        });
        self.pipe.notifiers.lock().push(child.notifier());
        pollable_source("pipe-input", child, cancel)
    }

    fn close(&mut self, _cancel: Option<&Cancellable>) -> Result<()> {
        {
            let mut state = self.pipe.state.lock();
            state.reader_closed = true;
            state.data.clear();
        }
        self.pipe.signal();
        Ok(())
    }
}

// ============================================================================
// ReaderInput
// ============================================================================

/// Blocking upstream over any [`Read`] implementation.
#[derive(Debug)]
pub struct ReaderInput<R> {
    reader: Option<R>,
}

impl<R: Read + Send> ReaderInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: Some(reader) }
    }

    /// The wrapped reader, `None` after close.
    pub fn get_ref(&self) -> Option<&R> {
        self.reader.as_ref()
    }

    pub fn into_inner(self) -> Option<R> {
        self.reader
    }
}

impl<R: Read + Send> PollableInput for ReaderInput<R> {
    fn read(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(Error::Closed);
        };
        if !blocking {
            return Err(Error::NotSupported("reader input cannot poll".to_string()));
        }
        loop {
            if let Some(cancel) = cancel {
                cancel.set_error_if_cancelled()?;
            }
            match reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&mut self, _cancel: Option<&Cancellable>) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_memory_chunks_and_limit() {
        let mut input = MemoryInput::from_bytes(b"abc").with_read_limit(2);
        input.add_bytes(b"de");
        let mut buf = [0u8; 8];
        assert_eq!(input.read(&mut buf, false, None).unwrap(), 2);
        assert_eq!(input.read(&mut buf, false, None).unwrap(), 1);
        assert_eq!(&buf[..1], b"c");
        assert_eq!(input.remaining(), 2);
        assert_eq!(input.read(&mut buf, false, None).unwrap(), 2);
        assert_eq!(input.read(&mut buf, false, None).unwrap(), 0);
        input.close(None).unwrap();
        assert!(matches!(input.read(&mut buf, true, None), Err(Error::Closed)));
    }

    #[test]
    fn test_memory_honors_cancel() {
        let mut input = MemoryInput::from_bytes(b"abc");
        let cancel = Cancellable::new();
        cancel.cancel();
        assert!(matches!(input.read(&mut [0u8; 4], true, Some(&cancel)), Err(Error::Cancelled)));
    }

    #[test]
    fn test_pipe_blocking_read_waits_for_writer() {
        let (writer, mut reader) = pipe();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(b"late");
        });
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf, true, None).unwrap(), 4);
        assert_eq!(&buf[..4], b"late");
        t.join().unwrap();
        // Writer dropped: end of stream.
        assert_eq!(reader.read(&mut buf, true, None).unwrap(), 0);
    }

    #[test]
    fn test_pipe_cancel_wakes_blocked_reader() {
        let (_writer, mut reader) = pipe();
        let cancel = Cancellable::new();
        let remote = cancel.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        assert!(matches!(reader.read(&mut [0u8; 4], true, Some(&cancel)), Err(Error::Cancelled)));
        t.join().unwrap();
    }

    #[test]
    fn test_pipe_source_fires_on_write() {
        let (writer, reader) = pipe();
        assert!(!reader.is_readable());
        let source = reader.create_source(None);
        assert!(!source.is_ready());
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(b"x");
            writer
        });
        assert!(source.wait(Some(Duration::from_secs(10))));
        assert!(reader.is_readable());
        drop(t.join().unwrap());
    }

    #[test]
    fn test_reader_input_is_blocking_only() {
        let mut input = ReaderInput::new(&b"bytes"[..]);
        assert!(!input.can_poll());
        assert!(matches!(input.read(&mut [0u8; 4], false, None), Err(Error::NotSupported(_))));
        let mut buf = [0u8; 8];
        assert_eq!(input.read(&mut buf, true, None).unwrap(), 5);
        input.close(None).unwrap();
        assert!(matches!(input.read(&mut buf, true, None), Err(Error::Closed)));
    }
}
