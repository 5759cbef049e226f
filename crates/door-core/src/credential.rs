use std::path::{Path, PathBuf};

use crate::error::{DoorError, Result};
use crate::{io, paths};

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Persists the attendant's scanner key on disk.
///
/// The key lives at `<root>/.door/scanner-key` as a bare string. An absent
/// or blank file means "no credential", which blocks scanning until one is
/// set.
///
/// ```rust,ignore
/// let store = CredentialStore::new(root);
/// if store.get().is_none() {
///     store.set("gate-a-7f3c")?;
/// }
/// ```
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(root: &Path) -> Self {
        CredentialStore {
            path: paths::credential_path(root),
        }
    }

    /// Return the stored key, or `None` if none is set.
    pub fn get(&self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    }

    /// Like [`get`](Self::get) but fails with `MissingCredential`.
    pub fn require(&self) -> Result<String> {
        self.get().ok_or(DoorError::MissingCredential)
    }

    /// Persist `key`. Surrounding whitespace is trimmed; a blank key is refused.
    pub fn set(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DoorError::EmptyCredential);
        }
        io::atomic_write(&self.path, key.as_bytes())
    }

    /// Delete the stored key (no-op if none exists).
    pub fn clear(&self) -> Result<()> {
        io::remove_if_exists(&self.path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
