//! JSON documents on disk, shared by the file-backed stores.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// A single JSON document on disk, written via temp file + rename.
///
/// Writers are serialised through an internal lock; a missing file reads as
/// `None`.
#[derive(Debug)]
pub(crate) struct JsonFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(&self.path, e)),
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| {
            Error::Storage(format!("{}: corrupt document: {e}", self.path.display()))
        })
    }

    pub(crate) fn store<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(value)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| storage_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))
    }

    pub(crate) fn remove(&self) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".into()))?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("absent.json"));
        let value: Option<serde_json::Value> = file.load().unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("nested/state.json"));
        file.store(&serde_json::json!({"a": 1})).unwrap();
        let value: Option<serde_json::Value> = file.load().unwrap();
        assert_eq!(value, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let file = JsonFile::new(&path);
        let result: Result<Option<serde_json::Value>, _> = file.load();
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("gone.json"));
        file.store(&1u32).unwrap();
        file.remove().unwrap();
        file.remove().unwrap();
        assert!(!file.path().exists());
    }
}
