// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Readiness sources.
//!
//! # Architecture
//!
//! A [`Source`] is a node in a tree. It is ready when its own condition holds
//! or when any child is ready. Producers hold a [`SourceNotifier`] (a weak
//! handle) and call [`SourceNotifier::wake`] after changing the state a
//! predicate observes; the wake propagates to every ancestor so a thread
//! blocked in [`Source::wait`] on the root re-checks readiness.
//!
//! ```text
//!         pollable source ("converter")
//!          /                     \
//!   upstream source        cancellable source
//! ```
//!
//! Waiting uses a generation counter and a `parking_lot` condvar: a waiter
//! snapshots the generation, checks readiness and only sleeps while the
//! generation is unchanged, so a wake between the check and the sleep is
//! never lost.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::cancel::Cancellable;

type Predicate = Box<dyn Fn() -> bool + Send + Sync>;
type Callback = Box<dyn FnMut(&Source) -> bool + Send>;

enum Readiness {
    /// Only children can make the source ready.
    Children,
    /// Ready as soon as it exists (zero-timeout tick).
    Always,
    Predicate(Predicate),
}

struct SourceInner {
    name: String,
    readiness: Readiness,
    children: Mutex<Vec<Source>>,
    parents: Mutex<Vec<Weak<SourceInner>>>,
    callback: Mutex<Option<Callback>>,
    destroyed: AtomicBool,
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl SourceInner {
    fn wake(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.condvar.notify_all();
        let parents: Vec<_> = self.parents.lock().iter().filter_map(Weak::upgrade).collect();
        for parent in parents {
            parent.wake();
        }
    }
}

/// A readiness condition composed of child conditions.
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.inner.name)
            .field("children", &self.inner.children.lock().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Source {}

impl Source {
    fn with_readiness(name: &str, readiness: Readiness) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                name: name.to_string(),
                readiness,
                children: Mutex::new(Vec::new()),
                parents: Mutex::new(Vec::new()),
                callback: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                generation: Mutex::new(0),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Source that is ready only through its children.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_readiness(name, Readiness::Children)
    }

    /// Source that is ready immediately.
    #[must_use]
    pub fn ready(name: &str) -> Self {
        Self::with_readiness(name, Readiness::Always)
    }

    /// Source ready whenever `predicate` holds. The producer changing the
    /// observed state must call [`SourceNotifier::wake`].
    #[must_use]
    pub fn from_predicate<F>(name: &str, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::with_readiness(name, Readiness::Predicate(Box::new(predicate)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach `child`; this source becomes ready whenever `child` is.
    pub fn add_child(&self, child: Source) {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            log::warn!("[source] '{}' cannot be its own child", self.inner.name);
            return;
        }
        child.inner.parents.lock().push(Arc::downgrade(&self.inner));
        self.inner.children.lock().push(child);
        self.inner.wake();
    }

    #[must_use]
    pub fn children(&self) -> Vec<Source> {
        self.inner.children.lock().clone()
    }

    /// Weak handle for producers.
    #[must_use]
    pub fn notifier(&self) -> SourceNotifier {
        SourceNotifier {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_ready(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let own = match &self.inner.readiness {
            Readiness::Children => false,
            Readiness::Always => true,
            Readiness::Predicate(predicate) => predicate(),
        };
        if own {
            return true;
        }
        let children = self.children();
        children.iter().any(Source::is_ready)
    }

    /// Block until the source is ready. `None` waits forever.
    ///
    /// Returns `false` on timeout or when the source is destroyed.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let seen = *self.inner.generation.lock();
            if self.is_ready() {
                return true;
            }
            if self.is_destroyed() {
                return false;
            }
            let mut generation = self.inner.generation.lock();
            if *generation != seen {
                continue;
            }
            match deadline {
                Some(deadline) => {
                    if self.inner.condvar.wait_until(&mut generation, deadline).timed_out() {
                        drop(generation);
                        return self.is_ready();
                    }
                }
                None => self.inner.condvar.wait(&mut generation),
            }
        }
    }

    /// Install the dispatch callback. Returning `false` from it destroys the
    /// source.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&Source) -> bool + Send + 'static,
    {
        *self.inner.callback.lock() = Some(Box::new(callback));
    }

    /// Run the callback once if the source is ready.
    ///
    /// Returns `true` when the callback ran.
    pub fn dispatch(&self) -> bool {
        if !self.is_ready() {
            return false;
        }
        // Taken out so the callback may touch this source.
        let Some(mut callback) = self.inner.callback.lock().take() else {
            return false;
        };
        let keep = callback(self);
        if keep {
            let mut slot = self.inner.callback.lock();
            if slot.is_none() && !self.is_destroyed() {
                *slot = Some(callback);
            }
        } else {
            self.destroy();
        }
        true
    }

    /// Detach the source and its children. Blocked waiters return `false`.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::trace!("[source] destroy '{}'", self.inner.name);
        self.inner.callback.lock().take();
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.destroy();
        }
        self.inner.wake();
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

/// Weak wake handle held by whatever produces readiness.
#[derive(Clone, Default)]
pub struct SourceNotifier {
    inner: Weak<SourceInner>,
}

impl fmt::Debug for SourceNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceNotifier")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl SourceNotifier {
    /// Wake the source and its ancestors. Returns `false` once the source
    /// is gone or destroyed, so producers can prune their lists.
    pub fn wake(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) if !inner.destroyed.load(Ordering::Acquire) => {
                inner.wake();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| !inner.destroyed.load(Ordering::Acquire))
    }
}

/// Source keyed to a pollable stream: ready when `child` is ready or when
/// `cancel` fires.
#[must_use]
pub fn pollable_source(name: &str, child: Source, cancel: Option<&Cancellable>) -> Source {
    let source = Source::new(name);
    source.add_child(child);
    if let Some(cancel) = cancel {
        source.add_child(cancel.create_source());
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_ready_and_composite() {
        let parent = Source::new("parent");
        assert!(!parent.is_ready());
        assert!(!parent.wait(Some(Duration::from_millis(5))));
        parent.add_child(Source::ready("tick"));
        assert!(parent.is_ready());
        assert!(parent.wait(Some(Duration::ZERO)));
        assert_eq!(parent.children().len(), 1);
    }

    #[test]
    fn test_predicate_wakes_waiter_through_parent() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&flag);
        let child = Source::from_predicate("flag", move || seen.load(Ordering::Acquire));
        let notifier = child.notifier();
        let parent = Source::new("parent");
        parent.add_child(child);

        let waiter = {
            let parent = parent.clone();
            thread::spawn(move || parent.wait(Some(Duration::from_secs(10))))
        };
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::Release);
        assert!(notifier.wake());
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_dispatch_and_destroy() {
        let source = Source::ready("once");
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        source.set_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            counter.load(Ordering::SeqCst) < 2
        });
        assert!(source.dispatch());
        assert!(!source.is_destroyed());
        assert!(source.dispatch());
        assert!(source.is_destroyed());
        assert!(!source.dispatch());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!source.notifier().is_alive());
    }

    #[test]
    fn test_destroy_releases_waiter() {
        let source = Source::new("idle");
        let waiter = {
            let source = source.clone();
            thread::spawn(move || source.wait(None))
        };
        thread::sleep(Duration::from_millis(20));
        source.destroy();
        assert!(!waiter.join().unwrap());
    }
}
