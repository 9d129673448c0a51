use std::sync::Arc;

use serde_json::Value;

use crate::datastore::{Datastore, KeyValueStore, OwnerId};
use crate::error::PersistenceError;

/// One physical row per `(owner, key)`, JSON encoded.
#[derive(Debug, Clone)]
pub struct RowStrategy {
    store: Arc<dyn KeyValueStore>,
}

impl RowStrategy {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl Datastore for RowStrategy {
    fn load(&self, owner: OwnerId, key: &str) -> Value {
        let bytes = match self.store.get(owner, key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Value::Null,
            Err(err) => {
                tracing::warn!(%owner, key, error = %err, "row read failed");
                return Value::Null;
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(%owner, key, error = %err, "row is not valid JSON");
            Value::Null
        })
    }

    fn save(&self, owner: OwnerId, key: &str, value: &Value) -> Result<(), PersistenceError> {
        if value.is_null() {
            return self.delete(owner, key);
        }
        let bytes = serde_json::to_vec(value).map_err(|err| PersistenceError::Encode {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        tracing::debug!(%owner, key, "writing row");
        self.store
            .set(owner, key, bytes)
            .map_err(|err| PersistenceError::backend(owner, key, err))
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError> {
        self.store
            .delete(owner, key)
            .map_err(|err| PersistenceError::backend(owner, key, err))
    }
}
