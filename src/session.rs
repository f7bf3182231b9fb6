//! Session credential storage.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Error;
use crate::storage::JsonFile;
use crate::types::SessionCredentials;

/// Storage for the client's access/refresh token pair.
///
/// Single-writer discipline: only the refresh path and explicit login/logout
/// call [`set`](SessionStore::set) or [`clear`](SessionStore::clear). Every
/// outgoing request calls [`get`](SessionStore::get) at send time.
///
/// # Example
///
/// ```rust,ignore
/// struct KeychainStore { /* ... */ }
///
/// impl SessionStore for KeychainStore {
///     fn get(&self) -> Result<Option<SessionCredentials>, Error> { self.read_entry() }
///     fn set(&self, credentials: SessionCredentials) -> Result<(), Error> { self.write_entry(&credentials) }
///     fn clear(&self) -> Result<(), Error> { self.delete_entry() }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Current credentials, if any.
    fn get(&self) -> Result<Option<SessionCredentials>, Error>;

    /// Replace the stored pair atomically.
    fn set(&self, credentials: SessionCredentials) -> Result<(), Error>;

    /// Remove all stored credentials.
    fn clear(&self) -> Result<(), Error>;
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<SessionCredentials>>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `credentials`.
    #[must_use]
    pub fn with_credentials(credentials: SessionCredentials) -> Self {
        Self {
            inner: RwLock::new(Some(credentials)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<SessionCredentials>, Error> {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| Error::Storage("session store lock poisoned".into()))
    }

    fn set(&self, credentials: SessionCredentials) -> Result<(), Error> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| Error::Storage("session store lock poisoned".into()))?;
        *guard = Some(credentials);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| Error::Storage("session store lock poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

/// Session store persisted as a JSON file, surviving process restarts.
#[derive(Debug)]
pub struct FileSessionStore {
    file: JsonFile,
}

impl FileSessionStore {
    /// Store backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<SessionCredentials>, Error> {
        self.file.load()
    }

    fn set(&self, credentials: SessionCredentials) -> Result<(), Error> {
        self.file.store(&credentials)
    }

    fn clear(&self) -> Result<(), Error> {
        self.file.remove()
    }
}
