// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared, append-only vault.
//
// `Vault` wraps the record list in a mutex so that hosts can hand one vault
// to several tasks. Each append holds the lock across read-last, hash, and
// push; at most one append is ever in flight per vault.

use std::sync::Mutex;

use ledgerguard_core::error::Result;
use ledgerguard_core::types::{Record, VerificationReport};
use tracing::{info, warn};

use crate::chain;
use crate::locks::lock;

/// An ordered ledger of records whose insertion order is chain order.
#[derive(Debug, Default)]
pub struct Vault {
    records: Mutex<Vec<Record>>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt records loaded from storage, in their stored order.
    ///
    /// Nothing is rehashed; call [`Vault::verify`] to check them.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Chain `record` onto the vault and return a copy of the stored entry.
    pub fn append(&self, record: Record) -> Record {
        let mut records = lock(&self.records);
        let stored = chain::append(&mut records, record).clone();
        info!(
            index = records.len() - 1,
            label = %stored.label,
            "record appended to vault"
        );
        stored
    }

    /// Chain `record`, hand it to `persist`, and keep it only if that succeeds.
    ///
    /// The lock is held throughout, so the next append cannot link against a
    /// record that never reached storage.
    pub fn try_append(
        &self,
        mut record: Record,
        persist: impl FnOnce(&Record) -> Result<()>,
    ) -> Result<Record> {
        let mut records = lock(&self.records);
        record.chain_hash = Some(chain::compute_chain_hash(
            &record,
            chain::linkage_hash(&records),
        ));

        if let Err(e) = persist(&record) {
            warn!(label = %record.label, error = %e, "record not persisted, vault unchanged");
            return Err(e);
        }

        records.push(record.clone());
        info!(
            index = records.len() - 1,
            label = %record.label,
            "record appended to vault"
        );
        Ok(record)
    }

    /// Verify the whole chain. Read-only; never aborts on the first error.
    pub fn verify(&self) -> VerificationReport {
        let records = lock(&self.records);
        let report = chain::verify_chain(&records);
        info!(
            records = records.len(),
            errors = report.errors.len(),
            valid = report.valid,
            "vault verified"
        );
        report
    }

    /// Copy of every record in chain order.
    pub fn snapshot(&self) -> Vec<Record> {
        lock(&self.records).clone()
    }

    /// The link the next appended record would be chained against.
    pub fn head(&self) -> String {
        chain::linkage_hash(&lock(&self.records)).to_owned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn with_records_mut<R>(&self, f: impl FnOnce(&mut Vec<Record>) -> R) -> R {
        f(&mut lock(&self.records))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::integrity::hash_bytes;

    fn make_record(label: &str) -> Record {
        Record::new(hash_bytes(label.as_bytes()), Utc::now(), label, "USMC")
    }

    #[test]
    fn append_returns_chained_copy() {
        let vault = Vault::new();
        assert_eq!(vault.head(), Record::GENESIS_HASH);

        let stored = vault.append(make_record("first"));
        assert!(stored.chain_hash.is_some());
        assert_eq!(vault.head(), stored.chain_hash.unwrap());
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn concurrent_appends_never_share_a_predecessor() {
        let vault = Arc::new(Vault::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let vault = Arc::clone(&vault);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        vault.append(make_record(&format!("t{t}-r{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(vault.len(), 200);
        assert!(vault.verify().valid);
    }

    #[test]
    fn tampering_surfaces_in_report() {
        let vault = Vault::new();
        for label in ["a", "b", "c"] {
            vault.append(make_record(label));
        }
        vault.with_records_mut(|records| records[1].hash = hash_bytes(b"evil"));

        let report = vault.verify();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 1);
    }

    #[test]
    fn failed_persist_leaves_vault_untouched() {
        let vault = Vault::new();
        vault.append(make_record("a"));
        let head = vault.head();

        let result = vault.try_append(make_record("b"), |_| {
            Err(ledgerguard_core::LedgerguardError::Database("disk full".into()))
        });
        assert!(result.is_err());
        assert_eq!(vault.len(), 1);
        assert_eq!(vault.head(), head);

        let stored = vault.try_append(make_record("c"), |_| Ok(())).unwrap();
        assert_eq!(vault.len(), 2);
        assert_eq!(vault.snapshot()[1], stored);
        assert!(vault.verify().valid);
    }

    #[test]
    fn persist_sees_the_chained_record() {
        let vault = Vault::new();
        let mut seen = None;
        let stored = vault
            .try_append(make_record("a"), |r| {
                seen = r.chain_hash.clone();
                Ok(())
            })
            .unwrap();
        assert!(seen.is_some());
        assert_eq!(seen, stored.chain_hash);
    }

    #[test]
    fn loaded_records_keep_their_order() {
        let source = Vault::new();
        for label in ["x", "y"] {
            source.append(make_record(label));
        }

        let reloaded = Vault::from_records(source.snapshot());
        assert_eq!(reloaded.snapshot(), source.snapshot());
        assert!(reloaded.verify().valid);
    }
}
