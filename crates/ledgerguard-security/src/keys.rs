// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session key management: one AES-256-GCM key per session.
//
// The raw key is exported once, base64-encoded, into a session-scoped slot
// so that ciphertexts written earlier in the session stay readable after a
// reload. It is never handed to callers; they receive an opaque handle.

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ledgerguard_core::config::DEFAULT_KEY_SLOT;
use ledgerguard_core::error::{LedgerguardError, Result};
use ring::aead::{AES_256_GCM, LessSafeKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, info, instrument, warn};

use crate::locks::lock;
use crate::session_store::SessionStore;

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Opaque handle to the session's AEAD key.
///
/// Cheap to clone; every clone refers to the same key.
#[derive(Clone)]
pub struct SessionKey(Arc<LessSafeKey>);

impl SessionKey {
    pub(crate) fn aead(&self) -> &LessSafeKey {
        &self.0
    }

    fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_LEN {
            return Err(LedgerguardError::KeyUnavailable(format!(
                "key material must be {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, raw).map_err(|_| {
            LedgerguardError::KeyUnavailable("failed to import AES-256-GCM key".into())
        })?;
        Ok(Self(Arc::new(LessSafeKey::new(unbound))))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Owns the session's encryption key and its persistence slot.
pub struct KeyManager {
    store: Arc<dyn SessionStore>,
    slot: String,
    rng: SystemRandom,
    /// Cached handle. Held locked across load-or-generate so concurrent
    /// first calls cannot both mint a key.
    key: Mutex<Option<SessionKey>>,
}

impl KeyManager {
    /// Manage the key stored under the default slot.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_slot(store, DEFAULT_KEY_SLOT)
    }

    pub fn with_slot(store: Arc<dyn SessionStore>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
            rng: SystemRandom::new(),
            key: Mutex::new(None),
        }
    }

    /// Return the session key, importing it from the slot or generating and
    /// persisting a fresh one.
    ///
    /// Idempotent within a session. A slot holding unusable material is an
    /// error, never a reason to generate a replacement: that would make every
    /// existing ciphertext permanently unreadable.
    #[instrument(skip(self), fields(slot = %self.slot))]
    pub fn get_or_create_key(&self) -> Result<SessionKey> {
        let mut cached = lock(&self.key);
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let stored = self.store.load(&self.slot).map_err(|e| {
            LedgerguardError::KeyUnavailable(format!("session slot unreadable: {e}"))
        })?;

        let key = match stored {
            Some(encoded) => {
                let raw = BASE64.decode(encoded.trim()).map_err(|e| {
                    warn!("session key slot holds invalid base64");
                    LedgerguardError::KeyUnavailable(format!("stored key is not base64: {e}"))
                })?;
                let key = SessionKey::from_raw(&raw)?;
                debug!("imported session key from slot");
                key
            }
            None => {
                let mut raw = [0u8; KEY_LEN];
                self.rng.fill(&mut raw).map_err(|_| {
                    LedgerguardError::KeyUnavailable("failed to generate key material".into())
                })?;
                let key = SessionKey::from_raw(&raw)?;
                self.store.store(&self.slot, &BASE64.encode(raw)).map_err(|e| {
                    LedgerguardError::KeyUnavailable(format!("session slot unwritable: {e}"))
                })?;
                info!("generated new session key");
                key
            }
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    /// Forget the key and wipe its slot. Call when the session ends.
    pub fn end_session(&self) -> Result<()> {
        let mut cached = lock(&self.key);
        *cached = None;
        self.store.remove(&self.slot)?;
        info!(slot = %self.slot, "session key cleared");
        Ok(())
    }
}
