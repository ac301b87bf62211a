// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mutex acquisition that survives poisoning.
//
// A panic in one caller must not turn every later security check into a
// panic as well, so poisoned guards are logged and recovered.

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                event = "LOCK_POISONED",
                "mutex was poisoned by an earlier panic; recovering inner state"
            );
            poisoned.into_inner()
        }
    }
}
