// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Ledgerguard.
//
// Only hard failures live here. Chain integrity violations, rate-limit
// refusals, and CSRF mismatches are ordinary return values, not errors.

use thiserror::Error;

/// Top-level error type for all Ledgerguard operations.
#[derive(Debug, Error)]
pub enum LedgerguardError {
    // -- Cryptography --
    /// The crypto provider could not generate or import the session key.
    ///
    /// Fatal to every encryption operation until resolved. The key slot is
    /// never silently regenerated, because that would orphan all existing
    /// ciphertexts.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed on decrypt (tampering, corruption, wrong key).
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("secure random generation failed")]
    Randomness,

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Runtime / configuration --
    #[error("async runtime unavailable: {0}")]
    Runtime(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LedgerguardError>;
