// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted storage: AES-256-GCM envelopes for strings the host persists.
//
// Envelope layout, base64 (standard alphabet, padded):
//
//   nonce (12 bytes) || ciphertext || tag (16 bytes)
//
// A fresh random nonce is drawn for every call, so the same plaintext never
// produces the same envelope twice.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ledgerguard_core::error::{LedgerguardError, Result};
use ring::aead::{Aad, NONCE_LEN, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, instrument, warn};

use crate::keys::KeyManager;

/// Length of the GCM authentication tag appended by `ring`.
pub const TAG_LEN: usize = 16;

/// Authenticated encryption of opaque strings under the session key.
pub struct EncryptedStore {
    keys: Arc<KeyManager>,
    rng: SystemRandom,
}

impl EncryptedStore {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            keys,
            rng: SystemRandom::new(),
        }
    }

    /// Encrypt `plaintext` and return the base64 envelope.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = self.keys.get_or_create_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| LedgerguardError::Encryption("failed to generate random nonce".into()))?;

        // `ring` encrypts in place and appends the tag.
        let mut in_out = plaintext.as_bytes().to_vec();
        key.aead()
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| LedgerguardError::Encryption("seal_in_place failed".into()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + in_out.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&in_out);

        debug!(envelope_len = envelope.len(), "encryption complete");
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a base64 envelope produced by [`EncryptedStore::encrypt`].
    ///
    /// Any failure yields `Decryption`; no partially decrypted output is ever
    /// returned.
    #[instrument(skip_all, fields(envelope_len = envelope.len()))]
    pub fn decrypt(&self, envelope: &str) -> Result<String> {
        let key = self.keys.get_or_create_key()?;

        let combined = BASE64
            .decode(envelope.trim())
            .map_err(|e| LedgerguardError::Decryption(format!("envelope is not base64: {e}")))?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(LedgerguardError::Decryption(format!(
                "envelope too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| LedgerguardError::Decryption("malformed nonce".into()))?;

        let mut in_out = sealed.to_vec();
        let plaintext = key
            .aead()
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| {
                warn!("envelope failed authentication");
                LedgerguardError::Decryption(
                    "authentication failed: wrong key, corrupted or tampered data".into(),
                )
            })?;

        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|_| LedgerguardError::Decryption("plaintext is not valid UTF-8".into()))?;

        debug!(plaintext_len = text.len(), "decryption complete");
        Ok(text)
    }
}
