use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::datastore::{KeyValueStore, MembershipStore, MemoryStore, OwnerId, StoreSnapshot};
use crate::error::{BackendError, PersistenceError};

/// Flat-file backend: the whole store lives in one CBOR file that is rewritten
/// after every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                StoreSnapshot::default()
            } else {
                serde_cbor::from_slice(&bytes)
                    .map_err(|err| PersistenceError::Corrupt(err.to_string()))?
            }
        } else {
            StoreSnapshot::default()
        };
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, BackendError> {
        self.inner.snapshot()
    }

    /// Replaces the content and writes it to disk.
    pub fn replace_snapshot(&self, snapshot: StoreSnapshot) -> Result<(), BackendError> {
        self.inner.replace_snapshot(snapshot)?;
        self.flush()
    }

    pub fn flush(&self) -> Result<(), BackendError> {
        let snapshot = self.inner.snapshot()?;
        let bytes = serde_cbor::to_vec(&snapshot).map_err(|err| BackendError::new(err.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, owner: OwnerId, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        KeyValueStore::get(&self.inner, owner, key)
    }

    fn set(&self, owner: OwnerId, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        self.inner.set(owner, key, bytes)?;
        self.flush()
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), BackendError> {
        self.inner.delete(owner, key)?;
        self.flush()
    }
}

impl MembershipStore for FileStore {
    fn get(&self, owner: OwnerId, relation: &str) -> Result<BTreeSet<u64>, BackendError> {
        MembershipStore::get(&self.inner, owner, relation)
    }

    fn replace(
        &self,
        owner: OwnerId,
        relation: &str,
        members: &BTreeSet<u64>,
    ) -> Result<(), BackendError> {
        self.inner.replace(owner, relation, members)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.cbor");
        {
            let store = FileStore::open(&path).expect("open");
            store.set(OwnerId(1), "title", b"\"Cafe\"".to_vec()).expect("set");
            store
                .replace(OwnerId(1), "category", &BTreeSet::from([4, 2]))
                .expect("replace");
        }
        let store = FileStore::open(&path).expect("reopen");
        assert_eq!(
            KeyValueStore::get(&store, OwnerId(1), "title").expect("get"),
            Some(b"\"Cafe\"".to_vec())
        );
        assert_eq!(
            MembershipStore::get(&store, OwnerId(1), "category").expect("get"),
            BTreeSet::from([2, 4])
        );
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.cbor");
        fs::write(&path, b"\xff\xff not cbor").expect("write");
        assert!(matches!(FileStore::open(&path), Err(PersistenceError::Corrupt(_))));
    }
}
