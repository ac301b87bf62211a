// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CSRF token guard.
//
// One token per guard, minted lazily from 32 random bytes and hex encoded.
// Exactly one token is valid at a time; `refresh` retires the previous one.
// Comparison is constant-time.

use std::sync::Mutex;

use ledgerguard_core::error::{LedgerguardError, Result};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::headers::HeaderMap;
use crate::locks::lock;

/// Header the token is attached under.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

const TOKEN_BYTES: usize = 32;

/// Issues and checks the session's anti-forgery token.
pub struct CsrfGuard {
    token: Mutex<Option<String>>,
    rng: SystemRandom,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("issued", &lock(&self.token).is_some())
            .finish()
    }
}

impl CsrfGuard {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
            rng: SystemRandom::new(),
        }
    }

    /// The current token, minting one on first use.
    pub fn get_token(&self) -> Result<String> {
        let mut token = lock(&self.token);
        if let Some(existing) = token.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = self.mint()?;
        *token = Some(fresh.clone());
        debug!("csrf token issued");
        Ok(fresh)
    }

    /// Replace the current token. The previous one stops validating.
    pub fn refresh(&self) -> Result<String> {
        let fresh = self.mint()?;
        *lock(&self.token) = Some(fresh.clone());
        info!("csrf token rotated");
        Ok(fresh)
    }

    /// True only if `candidate` equals the currently valid token.
    ///
    /// An empty candidate, or any candidate before a token has been issued,
    /// is rejected.
    pub fn validate(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        match lock(&self.token).as_deref() {
            Some(current) => current.as_bytes().ct_eq(candidate.as_bytes()).into(),
            None => false,
        }
    }

    /// Return `headers` with the current token added under [`CSRF_HEADER`].
    pub fn add_to_headers(&self, mut headers: HeaderMap) -> Result<HeaderMap> {
        headers.insert(CSRF_HEADER.to_owned(), self.get_token()?);
        Ok(headers)
    }

    fn mint(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| LedgerguardError::Randomness)?;
        Ok(hex::encode(bytes))
    }
}
