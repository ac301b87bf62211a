// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session-scoped key/value slots.
//
// The encryption key lives in exactly one slot whose lifetime is the user's
// session: it survives reloads within the session and is wiped when the
// session ends. Hosts supply the backing store.

use std::collections::HashMap;
use std::sync::Mutex;

use ledgerguard_core::error::Result;

use crate::locks::lock;

/// Storage for short-lived secrets, scoped to one session.
pub trait SessionStore: Send + Sync {
    /// Read a slot. Returns `None` if nothing has been stored.
    fn load(&self, slot: &str) -> Result<Option<String>>;

    /// Write a slot, replacing any previous value.
    fn store(&self, slot: &str, value: &str) -> Result<()>;

    /// Delete a slot. Deleting a missing slot is not an error.
    fn remove(&self, slot: &str) -> Result<()>;
}

/// Process-memory session store. Ends when the value is dropped.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, slot: &str) -> Result<Option<String>> {
        Ok(lock(&self.slots).get(slot).cloned())
    }

    fn store(&self, slot: &str, value: &str) -> Result<()> {
        lock(&self.slots).insert(slot.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        lock(&self.slots).remove(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_remove() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load("k").unwrap(), None);

        store.store("k", "v1").unwrap();
        store.store("k", "v2").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("v2"));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
    }
}
