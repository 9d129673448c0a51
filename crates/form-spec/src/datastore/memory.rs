use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::datastore::{KeyValueStore, MembershipStore, OwnerId};
use crate::error::BackendError;

/// Serializable content of a store: byte rows and membership sets per owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub rows: BTreeMap<OwnerId, BTreeMap<String, Vec<u8>>>,
    #[serde(default)]
    pub members: BTreeMap<OwnerId, BTreeMap<String, BTreeSet<u64>>>,
}

/// In-process backend implementing both collaborator interfaces.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, BackendError> {
        Ok(self.lock()?.clone())
    }

    pub fn replace_snapshot(&self, snapshot: StoreSnapshot) -> Result<(), BackendError> {
        *self.lock()? = snapshot;
        Ok(())
    }

    /// Number of physical rows held for `owner`.
    pub fn row_count(&self, owner: OwnerId) -> usize {
        self.lock()
            .map(|state| state.rows.get(&owner).map(BTreeMap::len).unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreSnapshot>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::new("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, owner: OwnerId, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let state = self.lock()?;
        Ok(state
            .rows
            .get(&owner)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn set(&self, owner: OwnerId, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state
            .rows
            .entry(owner)
            .or_default()
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        if let Some(rows) = state.rows.get_mut(&owner) {
            rows.remove(key);
            if rows.is_empty() {
                state.rows.remove(&owner);
            }
        }
        Ok(())
    }
}

impl MembershipStore for MemoryStore {
    fn get(&self, owner: OwnerId, relation: &str) -> Result<BTreeSet<u64>, BackendError> {
        let state = self.lock()?;
        Ok(state
            .members
            .get(&owner)
            .and_then(|relations| relations.get(relation))
            .cloned()
            .unwrap_or_default())
    }

    fn replace(
        &self,
        owner: OwnerId,
        relation: &str,
        members: &BTreeSet<u64>,
    ) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let set = state
            .members
            .entry(owner)
            .or_default()
            .entry(relation.to_string())
            .or_default();
        set.clear();
        set.extend(members.iter().copied());
        Ok(())
    }
}
