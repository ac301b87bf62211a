// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content fingerprinting: SHA-256 digests that become `Record::hash`.

use ledgerguard_core::error::LedgerguardError;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// This is the fingerprint collaborators store in `Record::hash` before a
/// record is appended to the vault.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Comparison is case-insensitive on the hex input so digests pasted from
/// tools that print uppercase still match.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), LedgerguardError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(LedgerguardError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}
