// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! String interning for type names and metadata keys.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Interned string handle. `Quark(0)` is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quark(u32);

impl Quark {
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Interning table. Lookups by string are lock-free; reverse lookups take a
/// read lock.
pub(crate) struct QuarkTable {
    by_name: DashMap<Arc<str>, Quark>,
    names: RwLock<Vec<Arc<str>>>,
}

impl QuarkTable {
    pub(crate) fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            names: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn intern(&self, s: &str) -> (Quark, Arc<str>) {
        if let Some(entry) = self.by_name.get(s) {
            let quark = *entry.value();
            return (quark, Arc::clone(entry.key()));
        }
        let name: Arc<str> = Arc::from(s);
        // Concurrent interners of the same string race on the entry; the
        // loser adopts the winner's quark.
        let entry = self.by_name.entry(Arc::clone(&name)).or_insert_with(|| {
            let mut names = self.names.write();
            names.push(Arc::clone(&name));
            Quark(names.len() as u32)
        });
        (*entry.value(), Arc::clone(entry.key()))
    }

    pub(crate) fn try_get(&self, s: &str) -> Option<Quark> {
        self.by_name.get(s).map(|entry| *entry.value())
    }

    pub(crate) fn to_str(&self, quark: Quark) -> Option<Arc<str>> {
        let index = (quark.0 as usize).checked_sub(1)?;
        self.names.read().get(index).cloned()
    }
}
