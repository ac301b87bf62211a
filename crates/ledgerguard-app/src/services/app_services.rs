// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service context: one value per user session holding every security
// component, wired to this host's storage.
//
// The SQLite connection is `Send` but not `Sync`, so the vault store sits
// behind a mutex. Appends hold that mutex across the insert and the
// in-memory push, and a record only joins the in-memory chain once its row
// is written, so the stored order always matches chain order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use ledgerguard_core::AppConfig;
use ledgerguard_core::error::{LedgerguardError, Result};
use ledgerguard_core::types::{Record, VerificationReport};
use ledgerguard_security::{
    CsrfGuard, EncryptedStore, KeyManager, MemorySessionStore, RateLimiter, SessionLock,
    SessionStore, Vault, hash_bytes,
};
use tracing::{debug, info, warn};

use super::data_dir;
use super::session_store::FileSessionStore;
use super::vault_store::VaultStore;

const CONFIG_FILE: &str = "config.json";
const VAULT_FILE: &str = "vault.db";

/// Everything one session needs. Construct inside a tokio runtime.
pub struct SecurityServices {
    data_dir: Option<PathBuf>,
    config: AppConfig,
    file_slots: Option<Arc<FileSessionStore>>,
    keys: Arc<KeyManager>,
    storage: EncryptedStore,
    vault: Vault,
    vault_store: Mutex<VaultStore>,
    rate_limiter: RateLimiter,
    csrf: CsrfGuard,
    session_lock: SessionLock,
}

impl SecurityServices {
    /// Initialise against the default data directory.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir()?;
        Self::open(&dir)
    }

    /// Initialise against `dir`: config, vault database and session slots
    /// all live underneath it.
    pub fn open(dir: &Path) -> Result<Self> {
        info!(path = %dir.display(), "initialising security services");

        let config = load_config(dir);
        config.validate()?;

        let vault_store = VaultStore::open(dir.join(VAULT_FILE))?;
        let file_slots = Arc::new(FileSessionStore::open(dir)?);
        let session_slots: Arc<dyn SessionStore> = file_slots.clone();

        Self::assemble(
            Some(dir.to_path_buf()),
            config,
            vault_store,
            session_slots,
            Some(file_slots),
        )
    }

    /// Non-persistent services for when the data directory is unusable.
    pub fn in_memory(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Self::assemble(
            None,
            config,
            VaultStore::open_in_memory()?,
            Arc::new(MemorySessionStore::new()),
            None,
        )
    }

    fn assemble(
        data_dir: Option<PathBuf>,
        config: AppConfig,
        vault_store: VaultStore,
        session_slots: Arc<dyn SessionStore>,
        file_slots: Option<Arc<FileSessionStore>>,
    ) -> Result<Self> {
        debug!(stored = vault_store.count()?, "loading vault records");
        let records = vault_store.load_all()?;
        let vault = Vault::from_records(records);
        let report = vault.verify();
        if !report.valid {
            warn!(
                errors = report.errors.len(),
                "stored vault failed chain verification"
            );
        }

        let keys = Arc::new(KeyManager::with_slot(
            session_slots,
            config.key_slot.clone(),
        ));
        let storage = EncryptedStore::new(Arc::clone(&keys));
        let rate_limiter = RateLimiter::new(&config.rate_limit);
        let session_lock = SessionLock::start(config.session.clone())?;

        info!(records = vault.len(), "security services initialised");

        Ok(Self {
            data_dir,
            config,
            file_slots,
            keys,
            storage,
            vault,
            vault_store: Mutex::new(vault_store),
            rate_limiter,
            csrf: CsrfGuard::new(),
            session_lock,
        })
    }

    // -- Audit chain ---------------------------------------------------------

    /// Fingerprint `document`, chain it into the vault and persist it.
    pub fn append_document(&self, document: &[u8], label: &str, branch: &str) -> Result<Record> {
        if !self.config.audit_enabled {
            return Err(LedgerguardError::Config("audit ledger is disabled".into()));
        }

        let record = Record::new(hash_bytes(document), Utc::now(), label, branch);

        let store = self
            .vault_store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.vault.try_append(record, |chained| store.insert(chained))
    }

    pub fn verify(&self) -> VerificationReport {
        self.vault.verify()
    }

    pub fn records(&self) -> Vec<Record> {
        self.vault.snapshot()
    }

    // -- Encrypted storage ---------------------------------------------------

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.storage.encrypt(plaintext)
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        self.storage.decrypt(envelope)
    }

    // -- Guards --------------------------------------------------------------

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn session_lock(&self) -> &SessionLock {
        &self.session_lock
    }

    // -- Session -------------------------------------------------------------

    /// Wipe the session key and every other session slot, and rotate the
    /// CSRF token. Anything encrypted during the session becomes unreadable.
    pub fn end_session(&self) -> Result<()> {
        self.keys.end_session()?;
        if let Some(slots) = &self.file_slots {
            slots.clear_all()?;
        }
        self.csrf.refresh()?;
        info!("session ended");
        Ok(())
    }

    // -- Config --------------------------------------------------------------

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Write the current config back to disk. A no-op for in-memory services.
    pub fn persist_config(&self) -> Result<()> {
        match &self.data_dir {
            Some(dir) => persist_config(dir, &self.config),
            None => Ok(()),
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}

/// Load `config.json` from `dir`, falling back to defaults.
fn load_config(dir: &Path) -> AppConfig {
    let path = dir.join(CONFIG_FILE);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
            AppConfig::default()
        }
    }
}

fn persist_config(dir: &Path, config: &AppConfig) -> Result<()> {
    let path = dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ledgerguard_core::types::ActivityKind;

    use super::*;

    #[tokio::test]
    async fn append_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();

        {
            let services = SecurityServices::open(dir.path()).unwrap();
            services.append_document(b"receipt 1", "Receipt", "Navy").unwrap();
            services.append_document(b"receipt 2", "Receipt", "Navy").unwrap();
            assert!(services.verify().valid);
        }

        let reopened = SecurityServices::open(dir.path()).unwrap();
        let records = reopened.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].hash, hash_bytes(b"receipt 1"));
        assert!(reopened.verify().valid);

        reopened.append_document(b"receipt 3", "Receipt", "Navy").unwrap();
        assert!(reopened.verify().valid);
    }

    #[tokio::test]
    async fn failed_insert_does_not_break_chain_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(VAULT_FILE);

        {
            let services = SecurityServices::open(dir.path()).unwrap();
            services.append_document(b"first", "Receipt", "Navy").unwrap();

            let side = rusqlite::Connection::open(&db_path).unwrap();
            side.execute_batch(
                "CREATE TRIGGER refuse_insert BEFORE INSERT ON records
                 BEGIN SELECT RAISE(ABORT, 'disk refused'); END;",
            )
            .unwrap();

            let result = services.append_document(b"lost", "Receipt", "Navy");
            assert!(matches!(result, Err(LedgerguardError::Database(_))));
            assert_eq!(services.records().len(), 1);

            side.execute_batch("DROP TRIGGER refuse_insert;").unwrap();
            services.append_document(b"second", "Receipt", "Navy").unwrap();
            assert_eq!(services.records().len(), 2);
            assert!(services.verify().valid);
        }

        let reopened = SecurityServices::open(dir.path()).unwrap();
        let records = reopened.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].hash, hash_bytes(b"second"));
        let report = reopened.verify();
        assert!(report.valid, "errors after reload: {:?}", report.errors);
    }

    #[tokio::test]
    async fn ciphertext_survives_restart_within_session() {
        let dir = tempfile::tempdir().unwrap();

        let envelope = {
            let services = SecurityServices::open(dir.path()).unwrap();
            services.encrypt("classified").unwrap()
        };

        let reopened = SecurityServices::open(dir.path()).unwrap();
        assert_eq!(reopened.decrypt(&envelope).unwrap(), "classified");
    }

    #[tokio::test]
    async fn end_session_makes_ciphertext_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let services = SecurityServices::open(dir.path()).unwrap();
        let envelope = services.encrypt("short-lived").unwrap();
        let token = services.csrf().get_token().unwrap();

        services.end_session().unwrap();

        assert!(!services.csrf().validate(&token));
        assert!(matches!(
            services.decrypt(&envelope),
            Err(LedgerguardError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn config_round_trips_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "rate_limit": { "default_max_per_minute": 2 } }"#,
        )
        .unwrap();

        let services = SecurityServices::open(dir.path()).unwrap();
        assert_eq!(services.config().rate_limit.default_max_per_minute, 2);
        assert!(services.rate_limiter().allow("anchor"));
        assert!(services.rate_limiter().allow("anchor"));
        assert!(!services.rate_limiter().allow("anchor"));

        services.persist_config().unwrap();
        let written = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        let parsed: AppConfig = serde_json::from_str(&written).unwrap();
        assert_eq!(&parsed, services.config());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.session.timeout_ms = 0;
        assert!(matches!(
            SecurityServices::in_memory(config),
            Err(LedgerguardError::Config(_))
        ));
    }

    #[tokio::test]
    async fn disabled_audit_refuses_appends() {
        let config = AppConfig {
            audit_enabled: false,
            ..AppConfig::default()
        };
        let services = SecurityServices::in_memory(config).unwrap();
        assert!(services.append_document(b"x", "l", "b").is_err());
        assert!(services.records().is_empty());
    }

    #[tokio::test]
    async fn in_memory_services_work_end_to_end() {
        let services = SecurityServices::in_memory(AppConfig::default()).unwrap();
        services.append_document(b"doc", "Doc", "Army").unwrap();
        assert!(services.verify().valid);
        assert!(services.session_lock().record_activity(ActivityKind::KeyDown));
        assert!(services.data_dir().is_none());
        services.persist_config().unwrap();
    }
}
