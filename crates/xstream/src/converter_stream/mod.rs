// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Converter input stream.
//!
//! # Architecture
//!
//! ```text
//!   upstream ──pull──> input_buffer ──convert──> converted_buffer ──copy──> caller
//!                           │                                      ^
//!                           └────────── direct convert ────────────┘
//! ```
//!
//! A read first drains already converted bytes, then tries to convert
//! straight into the caller's buffer, and only falls back to the internal
//! converted buffer when the converter needs more input or more room.
//! Blocking and non-blocking reads share one implementation; the only
//! place that can report [`Error::WouldBlock`] is the upstream pull.
//!
//! # Operation gate
//!
//! One operation runs at a time. A second caller fails with
//! [`Error::Pending`], any caller after [`ConverterInputStream::close`]
//! with [`Error::Closed`]. Asynchronous reads take the gate before their
//! worker thread starts.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::buffer::Buffer;
use crate::cancel::Cancellable;
use crate::config::{StreamConfig, END_OF_INPUT_RETRIES, REFILL_CHUNK, SKIP_CHUNK_SIZE};
use crate::converter::{Converter, ConverterFlags, ConverterResult};
use crate::error::{Error, PartialRead, Result};
use crate::source::{pollable_source, Source};
use crate::upstream::PollableInput;

// ============================================================================
// Stream state
// ============================================================================

struct StreamState {
    base: Box<dyn PollableInput>,
    converter: Box<dyn Converter>,
    input_buffer: Buffer,
    converted_buffer: Buffer,
    at_input_end: bool,
    finished: bool,
    need_input: bool,
    /// Error hit after bytes were already delivered; reported next read.
    deferred_error: Option<Error>,
    close_base_stream: bool,
    /// Readiness snapshot shared with [`Shared`], readable without the lock.
    buffered: Arc<AtomicBool>,
}

impl StreamState {
    fn flags(&self) -> ConverterFlags {
        if self.at_input_end {
            ConverterFlags::INPUT_AT_END
        } else {
            ConverterFlags::NONE
        }
    }

    /// Whether buffered bytes alone make a read progress.
    fn has_buffered_data(&self) -> bool {
        !self.converted_buffer.is_empty() || (!self.input_buffer.is_empty() && !self.need_input)
    }

    fn publish_readiness(&self) {
        self.buffered.store(self.has_buffered_data(), Ordering::Release);
    }

    /// Pull from upstream until `input_buffer` holds at least `at_least`
    /// bytes of room. Returns the bytes pulled; 0 means end of input.
    fn fill_input_buffer(&mut self, at_least: usize, blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        self.input_buffer.ensure_space(at_least);
        // The upstream read may block; readers of the snapshot must see
        // what is buffered meanwhile.
        self.publish_readiness();
        let nread = self.base.read(self.input_buffer.writable(), blocking, cancel)?;
        if nread > 0 {
            self.input_buffer.commit(nread);
            self.need_input = false;
            self.publish_readiness();
        }
        Ok(nread)
    }

    /// Fill after a converter asked for more input.
    ///
    /// Before end of input this pulls from upstream. At end of input it only
    /// counts the attempt, failing with `exhausted` once the converter keeps
    /// asking without progress.
    fn request_input(
        &mut self,
        blocking: bool,
        cancel: Option<&Cancellable>,
        stalls: &mut usize,
        exhausted: impl FnOnce() -> Error,
    ) -> Result<()> {
        if self.at_input_end {
            *stalls += 1;
            if *stalls > END_OF_INPUT_RETRIES {
                return Err(exhausted());
            }
            return Ok(());
        }
        let want = self.input_buffer.data_size() + REFILL_CHUNK;
        match self.fill_input_buffer(want, blocking, cancel) {
            Ok(0) => {
                self.at_input_end = true;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                self.need_input = true;
                Err(e)
            }
        }
    }

    fn read_internal(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        let result = self.read_step(buf, blocking, cancel);
        self.publish_readiness();
        result
    }

    fn read_step(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }
        let count = buf.len();

        let available = self.converted_buffer.data_size();
        if available > 0 && count <= available {
            return Ok(self.converted_buffer.read_into(buf));
        }
        let mut total = self.converted_buffer.read_into(buf);

        if self.input_buffer.is_empty()
            && total == 0
            && !self.at_input_end
            && self.fill_input_buffer(count, blocking, cancel)? == 0
        {
            self.at_input_end = true;
        }

        // Direct conversion into the caller's buffer. Skipped while there is
        // nothing to feed the converter and more input may still come.
        if !self.finished && !(self.input_buffer.is_empty() && !self.at_input_end) {
            let flags = self.flags();
            match self.converter.convert(self.input_buffer.data(), &mut buf[total..], flags) {
                Ok(outcome) => {
                    total += outcome.bytes_written;
                    self.input_buffer.consumed(outcome.bytes_read);
                    if outcome.result == ConverterResult::Finished {
                        self.finished = true;
                    }
                }
                Err(Error::PartialInput | Error::NoSpace) => {}
                Err(e) if total == 0 => return Err(e),
                Err(e) => {
                    log::debug!("[xstream] deferring converter error after {} bytes: {}", total, e);
                    self.deferred_error = Some(e);
                }
            }
        }

        if total > 0 {
            return Ok(total);
        }
        if self.finished {
            debug_assert!(self.converted_buffer.is_empty());
            return Ok(0);
        }

        // Buffered conversion: nothing was delivered to the caller yet.
        self.converted_buffer.ensure_space(count);
        let mut stalls = 0usize;
        loop {
            debug_assert!(!self.finished);

            if self.input_buffer.is_empty() && !self.at_input_end {
                self.request_input(blocking, cancel, &mut stalls, || Error::PartialInput)?;
                continue;
            }

            let flags = self.flags();
            let converted = self.converter.convert(
                self.input_buffer.data(),
                self.converted_buffer.writable(),
                flags,
            );
            match converted {
                Ok(outcome) => {
                    self.converted_buffer.commit(outcome.bytes_written);
                    self.input_buffer.consumed(outcome.bytes_read);
                    if outcome.result == ConverterResult::Finished {
                        self.finished = true;
                    }

                    if self.converted_buffer.is_empty() && !self.finished {
                        if outcome.bytes_read == 0 {
                            // Converted nothing; same as asking for input.
                            self.request_input(blocking, cancel, &mut stalls, || {
                                Error::Failed("converter made no progress at end of input".to_string())
                            })?;
                        }
                        continue;
                    }

                    let n = self.converted_buffer.read_into(buf);
                    debug_assert!(self.finished || n > 0);
                    return Ok(n);
                }
                Err(Error::PartialInput) => {
                    self.request_input(blocking, cancel, &mut stalls, || Error::PartialInput)?;
                }
                Err(Error::NoSpace) => {
                    // Doubles the buffer when compaction is not enough.
                    let size = self.converted_buffer.size();
                    self.converted_buffer.ensure_space(size + 1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Operation gate
// ============================================================================

struct Shared {
    pending: AtomicBool,
    closed: AtomicBool,
    can_poll: bool,
    buffered: Arc<AtomicBool>,
    state: Mutex<StreamState>,
}

/// Clears the pending flag on drop.
struct PendingGuard {
    shared: Arc<Shared>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.shared.pending.store(false, Ordering::Release);
    }
}

impl Shared {
    fn set_pending(self: &Arc<Self>) -> Result<PendingGuard> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            return Err(Error::Pending);
        }
        Ok(PendingGuard {
            shared: Arc::clone(self),
        })
    }

    fn read_all_locked(&self, buf: &mut [u8], cancel: Option<&Cancellable>) -> std::result::Result<usize, PartialRead> {
        let mut state = self.state.lock();
        let mut bytes_read = 0;
        while bytes_read < buf.len() {
            match state.read_internal(&mut buf[bytes_read..], true, cancel) {
                Ok(0) => break,
                Ok(n) => bytes_read += n,
                Err(error) => return Err(PartialRead { bytes_read, error }),
            }
        }
        Ok(bytes_read)
    }
}

fn check_count(count: usize) -> Result<()> {
    if count > isize::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "too large count value passed to stream operation: {count}"
        )));
    }
    Ok(())
}

// ============================================================================
// Async completion
// ============================================================================

/// Result of an operation running on a worker thread.
#[derive(Debug)]
pub struct AsyncOp<T, E = Error> {
    rx: Receiver<std::result::Result<T, E>>,
}

impl<T, E: From<Error>> AsyncOp<T, E> {
    fn ready(result: std::result::Result<T, E>) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(result);
        Self { rx }
    }

    fn lost() -> E {
        Error::Failed("async worker exited without a result".to_string()).into()
    }

    /// Block until the operation completes.
    pub fn wait(self) -> std::result::Result<T, E> {
        self.rx.recv().unwrap_or_else(|_| Err(Self::lost()))
    }

    /// `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<std::result::Result<T, E>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Self::lost())),
        }
    }

    /// Non-blocking poll; `None` while still running.
    pub fn try_take(&self) -> Option<std::result::Result<T, E>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Self::lost())),
        }
    }
}

// ============================================================================
// ConverterInputStream
// ============================================================================

/// Input stream that runs upstream bytes through a [`Converter`].
///
/// ```
/// use xstream::{ConverterInputStream, IdentityConverter, MemoryInput};
///
/// let stream = ConverterInputStream::new(MemoryInput::from_bytes(b"HELLO"), IdentityConverter);
/// let mut buf = [0u8; 3];
/// assert_eq!(stream.read(&mut buf, None)?, 3);
/// assert_eq!(stream.read(&mut buf, None)?, 2);
/// assert_eq!(stream.read(&mut buf, None)?, 0);
/// stream.close(None)?;
/// # Ok::<(), xstream::Error>(())
/// ```
pub struct ConverterInputStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConverterInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterInputStream")
            .field("closed", &self.is_closed())
            .field("pending", &self.has_pending())
            .field("can_poll", &self.shared.can_poll)
            .finish()
    }
}

impl ConverterInputStream {
    pub fn new<B, C>(base: B, converter: C) -> Self
    where
        B: PollableInput + 'static,
        C: Converter + 'static,
    {
        Self::with_config(base, converter, StreamConfig::default())
    }

    pub fn with_config<B, C>(base: B, converter: C, config: StreamConfig) -> Self
    where
        B: PollableInput + 'static,
        C: Converter + 'static,
    {
        let can_poll = base.can_poll();
        log::debug!(
            "[xstream] new converter stream (can_poll={}, buffer={})",
            can_poll,
            config.initial_buffer_size
        );
        let buffered = Arc::new(AtomicBool::new(false));
        Self {
            shared: Arc::new(Shared {
                pending: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                can_poll,
                buffered: Arc::clone(&buffered),
                state: Mutex::new(StreamState {
                    base: Box::new(base),
                    converter: Box::new(converter),
                    input_buffer: Buffer::new(config.initial_buffer_size),
                    converted_buffer: Buffer::new(config.initial_buffer_size),
                    at_input_end: false,
                    finished: false,
                    need_input: false,
                    deferred_error: None,
                    close_base_stream: config.close_base_stream,
                    buffered,
                }),
            }),
        }
    }

    /// Blocking read. Returns 0 at end of stream.
    pub fn read(&self, buf: &mut [u8], cancel: Option<&Cancellable>) -> Result<usize> {
        self.read_with(buf, true, cancel)
    }

    /// Non-blocking read; [`Error::WouldBlock`] when no data is ready.
    pub fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.can_poll() {
            return Err(Error::NotSupported("base stream cannot poll".to_string()));
        }
        self.read_with(buf, false, None)
    }

    fn read_with(&self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        check_count(buf.len())?;
        let _pending = self.shared.set_pending()?;
        let _current = cancel.map(Cancellable::push_guard);
        self.shared.state.lock().read_internal(buf, blocking, cancel)
    }

    /// Read until `buf` is full or the stream ends.
    pub fn read_all(&self, buf: &mut [u8], cancel: Option<&Cancellable>) -> std::result::Result<usize, PartialRead> {
        if buf.is_empty() {
            return Ok(0);
        }
        check_count(buf.len())?;
        let _pending = self.shared.set_pending()?;
        let _current = cancel.map(Cancellable::push_guard);
        self.shared.read_all_locked(buf, cancel)
    }

    /// Read and discard up to `count` bytes.
    ///
    /// Cancellation after some bytes were skipped returns the count skipped
    /// so far.
    pub fn skip(&self, count: usize, cancel: Option<&Cancellable>) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        check_count(count)?;
        let _pending = self.shared.set_pending()?;
        let _current = cancel.map(Cancellable::push_guard);

        let mut scratch = vec![0u8; SKIP_CHUNK_SIZE.min(count)];
        let mut state = self.shared.state.lock();
        let mut skipped = 0usize;
        while skipped < count {
            let want = scratch.len().min(count - skipped);
            match state.read_internal(&mut scratch[..want], true, cancel) {
                Ok(0) => break,
                Ok(n) => skipped += n,
                Err(Error::Cancelled) if skipped > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(skipped)
    }

    /// Close the stream. Closing twice is not an error.
    ///
    /// The stream is marked closed even when closing the base stream fails.
    pub fn close(&self, cancel: Option<&Cancellable>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let _pending = self.shared.set_pending()?;
        let _current = cancel.map(Cancellable::push_guard);
        let mut state = self.shared.state.lock();
        let result = if state.close_base_stream {
            state.base.close(cancel)
        } else {
            Ok(())
        };
        self.shared.closed.store(true, Ordering::Release);
        log::debug!("[xstream] stream closed");
        result
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn can_poll(&self) -> bool {
        self.shared.can_poll
    }

    /// Whether a non-blocking read would make progress.
    ///
    /// Buffered data counts even while another operation holds the stream.
    /// The base stream is only consulted when the stream is idle.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        if self.shared.buffered.load(Ordering::Acquire) {
            return true;
        }
        match self.shared.state.try_lock() {
            Some(state) => state.has_buffered_data() || state.base.is_readable(),
            None => false,
        }
    }

    /// Source that fires when the stream may be readable or `cancel` fires.
    #[must_use]
    pub fn create_source(&self, cancel: Option<&Cancellable>) -> Source {
        let child = if self.is_readable() {
            Source::ready("converter-ready")
        } else {
            self.shared.state.lock().base.create_source(None)
        };
        pollable_source("converter", child, cancel)
    }

    // ------------------------------------------------------------------------
    // Async
    // ------------------------------------------------------------------------

    fn spawn<T, E, F>(&self, cancel: Option<Cancellable>, op: F) -> AsyncOp<T, E>
    where
        T: Send + 'static,
        E: From<Error> + Send + 'static,
        F: FnOnce(&Shared, Option<&Cancellable>) -> std::result::Result<T, E> + Send + 'static,
    {
        let pending = match self.shared.set_pending() {
            Ok(guard) => guard,
            Err(e) => return AsyncOp::ready(Err(e.into())),
        };
        let (tx, rx) = channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("xstream-async".to_string())
            .spawn(move || {
                let result = {
                    let _current = cancel.as_ref().map(Cancellable::push_guard);
                    op(&pending.shared, cancel.as_ref())
                };
                // Gate released before the result is observable.
                drop(pending);
                let _ = tx.send(result);
            });
        match spawned {
            Ok(_) => AsyncOp { rx },
            Err(e) => {
                log::error!("[xstream] failed to spawn async worker: {}", e);
                AsyncOp::ready(Err(Error::from(e).into()))
            }
        }
    }

    /// Read up to `len` bytes on a worker thread.
    pub fn read_async(&self, len: usize, cancel: Option<Cancellable>) -> AsyncOp<Vec<u8>> {
        if let Err(e) = check_count(len) {
            return AsyncOp::ready(Err(e));
        }
        self.spawn(cancel, move |shared, cancel| {
            let mut buf = vec![0u8; len];
            if len == 0 {
                return Ok(buf);
            }
            let n = shared.state.lock().read_internal(&mut buf, true, cancel)?;
            buf.truncate(n);
            Ok(buf)
        })
    }

    /// [`ConverterInputStream::read_all`] on a worker thread. On failure the
    /// bytes already read are dropped; [`PartialRead::bytes_read`] tells how
    /// many there were.
    pub fn read_all_async(&self, len: usize, cancel: Option<Cancellable>) -> AsyncOp<Vec<u8>, PartialRead> {
        if let Err(e) = check_count(len) {
            return AsyncOp::ready(Err(e.into()));
        }
        self.spawn(cancel, move |shared, cancel| {
            let mut buf = vec![0u8; len];
            let n = shared.read_all_locked(&mut buf, cancel)?;
            buf.truncate(n);
            Ok(buf)
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Scoped access to the converter.
    pub fn converter<R>(&self, f: impl FnOnce(&mut dyn Converter) -> R) -> R {
        let mut state = self.shared.state.lock();
        f(state.converter.as_mut())
    }

    /// Scoped access to the upstream.
    pub fn base_stream<R>(&self, f: impl FnOnce(&mut dyn PollableInput) -> R) -> R {
        let mut state = self.shared.state.lock();
        f(state.base.as_mut())
    }

    #[must_use]
    pub fn close_base_stream(&self) -> bool {
        self.shared.state.lock().close_base_stream
    }

    pub fn set_close_base_stream(&self, close: bool) {
        self.shared.state.lock().close_base_stream = close;
    }
}

impl PollableInput for ConverterInputStream {
    fn read(&mut self, buf: &mut [u8], blocking: bool, cancel: Option<&Cancellable>) -> Result<usize> {
        self.read_with(buf, blocking, cancel)
    }

    fn can_poll(&self) -> bool {
        ConverterInputStream::can_poll(self)
    }

    fn is_readable(&self) -> bool {
        ConverterInputStream::is_readable(self)
    }

    fn create_source(&self, cancel: Option<&Cancellable>) -> Source {
        ConverterInputStream::create_source(self, cancel)
    }

    fn close(&mut self, cancel: Option<&Cancellable>) -> Result<()> {
        ConverterInputStream::close(self, cancel)
    }
}

impl io::Read for ConverterInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ConverterInputStream::read(self, buf, None).map_err(io::Error::from)
    }
}
