// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-backed session slots.
//
// One file per slot under `<data_dir>/session/`. The directory is wiped when
// the session ends, which takes the encryption key with it.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ledgerguard_core::error::{LedgerguardError, Result};
use ledgerguard_security::SessionStore;
use tracing::{debug, info};

use super::data_dir;

/// Session slots persisted as files, readable only by the current user.
#[derive(Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Use `<root>/session` as the slot directory.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = data_dir::subdir(root, "session")?;
        debug!(path = %dir.display(), "session store opened");
        Ok(Self { dir })
    }

    /// Remove every slot.
    pub fn clear_all(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&self.dir)?;
        info!(path = %self.dir.display(), "session slots cleared");
        Ok(())
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf> {
        let valid = !slot.is_empty()
            && slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(LedgerguardError::Config(format!(
                "invalid session slot name: {slot:?}"
            )));
        }
        Ok(self.dir.join(slot))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, slot: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.slot_path(slot)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, slot: &str, value: &str) -> Result<()> {
        let path = self.slot_path(slot)?;
        write_owner_only(&path, value)?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        match std::fs::remove_file(self.slot_path(slot)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `value` to `path` without it ever being readable by other users.
///
/// New files are created with mode 0600. An existing file is narrowed to
/// 0600 after truncation and before any bytes are written.
fn write_owner_only(path: &Path, value: &str) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(value.as_bytes())?;
        file.sync_all()
    }

    #[cfg(not(unix))]
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()
    }
}
