// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Ledgerguard security module.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One entry in the vault ledger.
///
/// Produced by collaborators outside the security module. The audit chain
/// only reads `hash` and `timestamp` and only ever writes `chain_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// SHA-256 hex fingerprint of the anchored content.
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    /// Human label (falls back to `type` in older exports).
    #[serde(alias = "type")]
    pub label: String,
    pub branch: String,
    /// Link into the tamper-evidence chain. `None` for legacy entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Record {
    /// The `previous_hash` used for the first entry of every chain.
    ///
    /// 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// A fresh, unchained record.
    pub fn new(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        label: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            timestamp,
            label: label.into(),
            branch: branch.into(),
            chain_hash: None,
            tx_hash: None,
            source: None,
        }
    }

    /// Timestamp in the exact form that is fed into the chain hash:
    /// RFC 3339, millisecond precision, `Z` suffix.
    pub fn canonical_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// `chain_hash` if present and non-empty.
    pub fn chain_hash(&self) -> Option<&str> {
        self.chain_hash.as_deref().filter(|h| !h.is_empty())
    }

    /// `hash` if non-empty.
    pub fn raw_hash(&self) -> Option<&str> {
        Some(self.hash.as_str()).filter(|h| !h.is_empty())
    }
}

/// A single linkage mismatch found by chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainError {
    /// Position of the offending record in the vault.
    pub index: usize,
    /// The chain hash recomputed from the record and its predecessor.
    pub expected: String,
    /// The chain hash actually stored on the record.
    pub got: String,
    pub record_label: String,
}

/// Outcome of walking a vault's hash chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    /// Mismatches in vault order, one per corrupted record.
    pub errors: Vec<ChainError>,
}

impl VerificationReport {
    pub fn from_errors(errors: Vec<ChainError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Lifecycle of the idle session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLockState {
    /// Workspace visible; idle deadline armed.
    Active,
    /// Workspace hidden until an explicit resume.
    Locked,
}

impl std::fmt::Display for SessionLockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionLockState::Active => write!(f, "ACTIVE"),
            SessionLockState::Locked => write!(f, "LOCKED"),
        }
    }
}

/// User-input signals that count as activity for the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    PointerMove,
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    /// Accepts DOM event names (`mousemove`, `keydown`, ...) as well as the
    /// variant names.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mousemove" | "pointermove" => Ok(ActivityKind::PointerMove),
            "mousedown" | "pointerdown" => Ok(ActivityKind::PointerDown),
            "keydown" => Ok(ActivityKind::KeyDown),
            "scroll" => Ok(ActivityKind::Scroll),
            "touchstart" => Ok(ActivityKind::TouchStart),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_timestamp_has_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        let record = Record::new("ab", ts, "DD250", "Navy");
        assert_eq!(record.canonical_timestamp(), "2025-03-14T15:09:26.000Z");
    }

    #[test]
    fn empty_hashes_are_treated_as_absent() {
        let mut record = Record::new("", Utc::now(), "x", "y");
        record.chain_hash = Some(String::new());
        assert!(record.raw_hash().is_none());
        assert!(record.chain_hash().is_none());
    }

    #[test]
    fn legacy_json_with_type_field_deserializes() {
        let json = r#"{
            "hash": "abc",
            "timestamp": "2025-01-01T00:00:00.000Z",
            "type": "Receipt",
            "branch": "Army"
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.label, "Receipt");
        assert!(record.chain_hash.is_none());
    }

    #[test]
    fn activity_kind_parses_dom_names() {
        assert_eq!("mousemove".parse::<ActivityKind>(), Ok(ActivityKind::PointerMove));
        assert_eq!("touchstart".parse::<ActivityKind>(), Ok(ActivityKind::TouchStart));
        assert!("click".parse::<ActivityKind>().is_err());
    }

    #[test]
    fn report_validity_follows_errors() {
        assert!(VerificationReport::from_errors(Vec::new()).valid);
        let report = VerificationReport::from_errors(vec![ChainError {
            index: 1,
            expected: "a".into(),
            got: "b".into(),
            record_label: "r".into(),
        }]);
        assert!(!report.valid);
    }
}
