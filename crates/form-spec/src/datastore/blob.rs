use std::sync::Arc;

use serde_json::{Map, Value};

use crate::datastore::{Datastore, KeyValueStore, OwnerId};
use crate::error::PersistenceError;
use crate::field::is_empty;

/// Many logical keys packed into one CBOR-encoded map stored under `row`.
///
/// Every save re-reads, merges and rewrites the whole row. There is no locking:
/// two concurrent saves of different keys for the same owner can lose one write.
#[derive(Debug, Clone)]
pub struct BlobStrategy {
    store: Arc<dyn KeyValueStore>,
    row: String,
}

impl BlobStrategy {
    pub fn new(store: Arc<dyn KeyValueStore>, row: impl Into<String>) -> Self {
        Self {
            store,
            row: row.into(),
        }
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    /// Decoded row; unreadable or corrupt rows read as empty.
    pub fn read_row(&self, owner: OwnerId) -> Map<String, Value> {
        let bytes = match self.store.get(owner, &self.row) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Map::new(),
            Err(err) => {
                tracing::warn!(%owner, row = %self.row, error = %err, "blob read failed");
                return Map::new();
            }
        };
        serde_cbor::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(%owner, row = %self.row, error = %err, "blob row is corrupt");
            Map::new()
        })
    }

    fn write_row(&self, owner: OwnerId, row: &Map<String, Value>) -> Result<(), PersistenceError> {
        let result = if row.is_empty() {
            self.store.delete(owner, &self.row)
        } else {
            let bytes = serde_cbor::to_vec(row).map_err(|err| PersistenceError::Encode {
                key: self.row.clone(),
                message: err.to_string(),
            })?;
            self.store.set(owner, &self.row, bytes)
        };
        result.map_err(|err| PersistenceError::backend(owner, &self.row, err))
    }
}

impl Datastore for BlobStrategy {
    fn load(&self, owner: OwnerId, key: &str) -> Value {
        self.read_row(owner).remove(key).unwrap_or(Value::Null)
    }

    fn save(&self, owner: OwnerId, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let mut row = self.read_row(owner);
        if is_empty(value) {
            row.remove(key);
        } else {
            row.insert(key.to_string(), value.clone());
        }
        tracing::debug!(%owner, row = %self.row, key, "rewriting blob row");
        self.write_row(owner, &row)
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError> {
        let mut row = self.read_row(owner);
        if row.remove(key).is_none() {
            return Ok(());
        }
        self.write_row(owner, &row)
    }
}
