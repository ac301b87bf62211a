// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerguardError, Result};

/// Default idle timeout before the session locks: 30 minutes.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Default per-key budget for the rate limiter.
pub const DEFAULT_MAX_PER_MINUTE: usize = 30;

/// Length of the rate limiter's trailing window.
pub const DEFAULT_RATE_WINDOW_MS: u64 = 60_000;

/// Session-scoped slot the encryption key is persisted under.
pub const DEFAULT_KEY_SLOT: &str = "ledgerguard_enc_key";

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Idle-lock behaviour.
    pub session: SessionConfig,
    /// Client-side call throttling.
    pub rate_limit: RateLimitConfig,
    /// Name of the session storage slot holding the base64 key.
    pub key_slot: String,
    /// Enable the hash-chained audit ledger.
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            key_slot: DEFAULT_KEY_SLOT.to_owned(),
            audit_enabled: true,
        }
    }
}

impl AppConfig {
    /// Reject settings that would make a component meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.session.timeout_ms == 0 {
            return Err(LedgerguardError::Config(
                "session.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(LedgerguardError::Config(
                "rate_limit.window_ms must be greater than zero".into(),
            ));
        }
        if self.key_slot.trim().is_empty() {
            return Err(LedgerguardError::Config("key_slot must not be empty".into()));
        }
        Ok(())
    }
}

/// Idle session lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Milliseconds of inactivity before the workspace locks.
    pub timeout_ms: u64,
    /// Title of the notification emitted on lock.
    pub lock_title: String,
    /// Body of the notification emitted on lock.
    pub lock_message: String,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shorthand used by tests and embedders that only care about timing.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            lock_title: "Session Locked".to_owned(),
            lock_message: "Inactive for 30 minutes. Click to resume.".to_owned(),
        }
    }
}

/// Sliding-window rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Budget used when a caller does not pass one.
    pub default_max_per_minute: usize,
    /// Width of the trailing window in milliseconds.
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_max_per_minute: DEFAULT_MAX_PER_MINUTE,
            window_ms: DEFAULT_RATE_WINDOW_MS,
        }
    }
}
