// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hash-chain primitives: computing, appending, and verifying chain links.
//
// Hash input layout (UTF-8, in order):
//   1. previous link hash (64 hex chars, genesis for the first record)
//   2. "|"
//   3. record.hash
//   4. "|"
//   5. record timestamp, RFC 3339 with milliseconds and `Z`
//
// The chain is a forward link, not a consensus ledger. It shows after the
// fact that a record was altered or reordered. Someone who can rewrite the
// whole vault consistently is out of its reach.
//
// Legacy records without a `chain_hash` link through their raw `hash`. Any
// prefix made only of such records carries no tamper evidence at all.

use ledgerguard_core::types::{ChainError, Record, VerificationReport};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const SEPARATOR: &[u8] = b"|";

/// Compute the chain hash binding `record` to `previous_hash`.
///
/// Pure and deterministic. An empty `previous_hash` is treated as genesis.
/// Returns a lowercase 64-character hex string.
pub fn compute_chain_hash(record: &Record, previous_hash: &str) -> String {
    let previous = if previous_hash.is_empty() {
        Record::GENESIS_HASH
    } else {
        previous_hash
    };

    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(record.hash.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(record.canonical_timestamp().as_bytes());

    hex::encode(hasher.finalize())
}

/// The hash the next record links against, given the current vault.
///
/// This is the predecessor's `chain_hash`, else its raw `hash`, else the
/// link carried from further back, else genesis. It is exactly the running
/// value `verify_chain` holds after the last record, so a vault built by
/// `append` always verifies.
pub fn linkage_hash(records: &[Record]) -> &str {
    records
        .iter()
        .rev()
        .find_map(|r| r.chain_hash().or_else(|| r.raw_hash()))
        .unwrap_or(Record::GENESIS_HASH)
}

/// Chain `record` onto the end of `records` and return the stored entry.
///
/// Taking `&mut` serialises appends: nobody else can read the same last
/// record while this one is being linked.
pub fn append(records: &mut Vec<Record>, mut record: Record) -> &Record {
    let chain_hash = compute_chain_hash(&record, linkage_hash(records));
    debug!(index = records.len(), %chain_hash, "record chained");

    record.chain_hash = Some(chain_hash);
    let index = records.len();
    records.push(record);
    &records[index]
}

/// Walk the vault in order and report every broken link.
///
/// A mismatch is recorded and the walk continues from the *stored* chain
/// hash, so a single corrupted record is reported once instead of
/// cascading into every record after it. Records without a chain hash are
/// not checked; they advance the link to their raw `hash`.
pub fn verify_chain(records: &[Record]) -> VerificationReport {
    let mut errors = Vec::new();
    let mut prev = Record::GENESIS_HASH;

    for (index, record) in records.iter().enumerate() {
        match record.chain_hash() {
            Some(stored) => {
                let expected = compute_chain_hash(record, prev);
                if expected != stored {
                    warn!(index, label = %record.label, "chain link mismatch");
                    errors.push(ChainError {
                        index,
                        expected,
                        got: stored.to_owned(),
                        record_label: record.label.clone(),
                    });
                }
                prev = stored;
            }
            None => {
                if let Some(raw) = record.raw_hash() {
                    prev = raw;
                }
            }
        }
    }

    VerificationReport::from_errors(errors)
}
