// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vault persistence: append-only SQLite table of ledger records.
//
// Schema:
//   records(
//     id          INTEGER PRIMARY KEY AUTOINCREMENT,  -- chain order
//     hash        TEXT NOT NULL,
//     timestamp   TEXT NOT NULL,   -- RFC 3339, millisecond precision, Z
//     label       TEXT NOT NULL,
//     branch      TEXT NOT NULL,
//     chain_hash  TEXT,            -- NULL for legacy records
//     tx_hash     TEXT,
//     source      TEXT
//   )
//
// Timestamps are written in the same canonical form the chain hash is
// computed over, so a reload reproduces every link exactly.

use std::path::Path;

use chrono::{DateTime, Utc};
use ledgerguard_core::error::{LedgerguardError, Result};
use ledgerguard_core::types::Record;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use tracing::{debug, instrument};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    hash        TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    label       TEXT NOT NULL,
    branch      TEXT NOT NULL,
    chain_hash  TEXT,
    tx_hash     TEXT,
    source      TEXT
);";

fn db_err(e: rusqlite::Error) -> LedgerguardError {
    LedgerguardError::Database(e.to_string())
}

/// SQLite-backed record storage. Rows are never updated or deleted.
pub struct VaultStore {
    conn: Connection,
}

impl VaultStore {
    /// Open (or create) the vault database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("vault store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory vault store opened");
        Ok(Self { conn })
    }

    /// Append one record at the end of the stored chain.
    pub fn insert(&self, record: &Record) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO records (hash, timestamp, label, branch, chain_hash, tx_hash, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.hash,
                    record.canonical_timestamp(),
                    record.label,
                    record.branch,
                    record.chain_hash,
                    record.tx_hash,
                    record.source,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Every stored record, in chain order.
    pub fn load_all(&self) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT hash, timestamp, label, branch, chain_hash, tx_hash, source
                 FROM records
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map([], row_to_record).map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let raw_ts: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Record {
        hash: row.get(0)?,
        timestamp,
        label: row.get(2)?,
        branch: row.get(3)?,
        chain_hash: row.get(4)?,
        tx_hash: row.get(5)?,
        source: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use ledgerguard_security::chain;

    use super::*;

    fn make_record(n: u32) -> Record {
        let ts = Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, n).unwrap();
        Record::new(format!("{n:064x}"), ts, format!("Doc {n}"), "Army")
    }

    #[test]
    fn insert_and_count() {
        let store = VaultStore::open_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);

        store.insert(&make_record(1)).unwrap();
        store.insert(&make_record(2)).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn reload_preserves_order_and_chain() {
        let store = VaultStore::open_in_memory().unwrap();
        let mut records = Vec::new();
        for n in 0..5 {
            let stored = chain::append(&mut records, make_record(n)).clone();
            store.insert(&stored).unwrap();
        }

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, records);
        assert!(chain::verify_chain(&loaded).valid);
    }

    #[test]
    fn legacy_record_without_chain_hash_round_trips() {
        let store = VaultStore::open_in_memory().unwrap();
        let mut legacy = make_record(7);
        legacy.tx_hash = Some("0xabc".into());
        store.insert(&legacy).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![legacy]);
        assert!(loaded[0].chain_hash.is_none());
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = VaultStore::open(&path).unwrap();
            store.insert(&make_record(3)).unwrap();
        }

        let store = VaultStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.load_all().unwrap()[0].label, "Doc 3");
    }
}
