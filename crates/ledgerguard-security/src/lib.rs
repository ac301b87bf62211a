// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! ledgerguard-security: the tamper-evidence and session-protection layer.
//!
//! The presentation layer calls into this crate for five things: chaining
//! and verifying ledger records, encrypting strings under a session key,
//! stamping requests with a CSRF token, throttling bursts of calls, and
//! locking the workspace after a period of inactivity.
//!
//! Every component is a plain value owned by the host. There is no global
//! state, so several independent sessions can live in one process.

pub mod chain;
pub mod csrf;
pub mod headers;
pub mod integrity;
pub mod keys;
mod locks;
pub mod rate_limit;
pub mod sanitize;
pub mod session_lock;
pub mod session_store;
pub mod storage;
pub mod vault;

use serde::Serialize;

// PUBLIC API: Re-export core security primitives
pub use chain::{append, compute_chain_hash, linkage_hash, verify_chain};
pub use csrf::{CSRF_HEADER, CsrfGuard};
pub use headers::{HeaderMap, SECURITY_HEADERS, apply_security_headers};
pub use integrity::{hash_bytes, verify_hash};
pub use keys::{KeyManager, SessionKey};
pub use rate_limit::RateLimiter;
pub use sanitize::{escape_text, sanitize_html};
pub use session_lock::{LockEvent, SessionLock};
pub use session_store::{MemorySessionStore, SessionStore};
pub use storage::EncryptedStore;
pub use vault::Vault;

/// Capabilities this crate provides, as advertised to the host registry.
pub const FEATURES: &[&str] = &[
    "xss-sanitizer",
    "session-timeout",
    "encrypted-storage",
    "audit-chain",
    "rate-limiter",
    "csrf-token",
];

/// Registration record the host shows in its module list.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub features: &'static [&'static str],
}

pub fn module_info() -> ModuleInfo {
    ModuleInfo {
        name: "security",
        version: env!("CARGO_PKG_VERSION"),
        features: FEATURES,
    }
}
