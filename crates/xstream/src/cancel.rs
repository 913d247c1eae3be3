// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellation tokens.
//!
//! A [`Cancellable`] is shared by cloning. Blocking operations poll
//! [`Cancellable::is_cancelled`] or register a handler with
//! [`Cancellable::connect`] to be woken. Each thread also keeps a stack of
//! "current" tokens: stream operations push the token they were given for
//! the duration of the call so nested code can find it with
//! [`Cancellable::current`].

use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::source::{Source, SourceNotifier};

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Identifies a handler registered with [`Cancellable::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct Handlers {
    handlers: Vec<(HandlerId, Handler)>,
    notifiers: Vec<SourceNotifier>,
}

struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<Handlers>,
}

/// Cancellation token.
#[derive(Clone)]
pub struct Cancellable {
    inner: Arc<Inner>,
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl PartialEq for Cancellable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Cancellable {}

thread_local! {
    static CURRENT: RefCell<Vec<Cancellable>> = const { RefCell::new(Vec::new()) };
}

impl Cancellable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                state: Mutex::new(Handlers::default()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Cancel the token. Handlers run on the calling thread; a second call
    /// before [`Cancellable::reset`] does nothing.
    pub fn cancel(&self) {
        let (handlers, notifiers) = {
            let mut state = self.inner.state.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            state.notifiers.retain(SourceNotifier::is_alive);
            let handlers: Vec<Handler> = state.handlers.iter().map(|(_, h)| Arc::clone(h)).collect();
            (handlers, state.notifiers.clone())
        };
        log::debug!("[cancellable] cancelled ({} handlers)", handlers.len());
        for handler in handlers {
            handler();
        }
        for notifier in notifiers {
            notifier.wake();
        }
    }

    /// Clear the cancelled state. Connected handlers stay connected.
    pub fn reset(&self) {
        let _state = self.inner.state.lock();
        self.inner.cancelled.store(false, Ordering::Release);
    }

    /// `Err(Cancelled)` if the token has fired.
    pub fn set_error_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `handler` when the token is cancelled.
    ///
    /// An already cancelled token runs `handler` immediately and returns
    /// `None`.
    pub fn connect<F>(&self, handler: F) -> Option<HandlerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock();
        if self.is_cancelled() {
            drop(state);
            handler();
            return None;
        }
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        state.handlers.push((id, Arc::new(handler)));
        Some(id)
    }

    pub fn disconnect(&self, id: HandlerId) {
        let mut state = self.inner.state.lock();
        let before = state.handlers.len();
        state.handlers.retain(|(h, _)| *h != id);
        if state.handlers.len() == before {
            log::debug!("[cancellable] disconnect of unknown handler {:?}", id);
        }
    }

    /// Source that becomes ready once the token is cancelled.
    #[must_use]
    pub fn create_source(&self) -> Source {
        let token = self.clone();
        let source = Source::from_predicate("cancellable", move || token.is_cancelled());
        let mut state = self.inner.state.lock();
        state.notifiers.retain(SourceNotifier::is_alive);
        state.notifiers.push(source.notifier());
        source
    }

    // ------------------------------------------------------------------------
    // Thread-local current stack
    // ------------------------------------------------------------------------

    /// Make this token the current one of the calling thread.
    pub fn push_current(&self) {
        CURRENT.with(|stack| stack.borrow_mut().push(self.clone()));
    }

    /// Undo [`Cancellable::push_current`]. Must match the top of the stack.
    pub fn pop_current(&self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last() {
                Some(top) if top == self => {
                    stack.pop();
                }
                _ => log::warn!("[cancellable] pop_current of a token that is not current"),
            }
        });
    }

    /// Innermost token pushed on the calling thread.
    #[must_use]
    pub fn current() -> Option<Cancellable> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Push as current until the guard drops.
    #[must_use = "the token is popped when the guard drops"]
    pub fn push_guard(&self) -> CurrentGuard {
        self.push_current();
        CurrentGuard { token: self.clone() }
    }
}

/// Pops its token from the current stack on drop.
#[derive(Debug)]
pub struct CurrentGuard {
    token: Cancellable,
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        self.token.pop_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_cancel_runs_handlers_once() {
        let token = Cancellable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = token.connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(id.is_some());
        assert!(token.set_error_if_cancelled().is_ok());

        token.cancel();
        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(token.set_error_if_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_connect_after_cancel_runs_immediately() {
        let token = Cancellable::new();
        token.cancel();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        assert!(token
            .connect(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_and_reset() {
        let token = Cancellable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = token
            .connect(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        token.disconnect(id);
        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_source_fires_on_cancel() {
        let token = Cancellable::new();
        let source = token.create_source();
        assert!(!source.is_ready());
        let remote = token.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        assert!(source.wait(Some(Duration::from_secs(10))));
        t.join().unwrap();
    }

    #[test]
    fn test_current_stack() {
        assert!(Cancellable::current().is_none());
        let outer = Cancellable::new();
        let inner = Cancellable::new();
        {
            let _outer = outer.push_guard();
            {
                let _inner = inner.push_guard();
                assert_eq!(Cancellable::current(), Some(inner.clone()));
            }
            assert_eq!(Cancellable::current(), Some(outer.clone()));
        }
        assert!(Cancellable::current().is_none());
    }
}
