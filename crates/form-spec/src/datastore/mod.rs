pub mod association;
pub mod blob;
pub mod composite;
pub mod file;
pub mod memory;
pub mod row;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackendError, PersistenceError};
use crate::spec::field::{FieldDefinition, StorageSpec};

pub use association::AssociationStrategy;
pub use blob::BlobStrategy;
pub use composite::{CompositePart, CompositeStrategy};
pub use file::FileStore;
pub use memory::{MemoryStore, StoreSnapshot};
pub use row::RowStrategy;

/// Identifier of the record owning persisted field values (a listing, a user, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical `(owner, field key) -> value` storage. Reads degrade to an empty
/// value; writes report failures.
pub trait Datastore: fmt::Debug + Send + Sync {
    fn load(&self, owner: OwnerId, key: &str) -> Value;
    fn save(&self, owner: OwnerId, key: &str, value: &Value) -> Result<(), PersistenceError>;
    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError>;
}

/// Generic keyed byte store consumed by the row and blob strategies.
pub trait KeyValueStore: fmt::Debug + Send + Sync {
    fn get(&self, owner: OwnerId, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    fn set(&self, owner: OwnerId, key: &str, bytes: Vec<u8>) -> Result<(), BackendError>;
    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), BackendError>;
}

/// Membership sets of foreign ids per `(owner, relation)`.
pub trait MembershipStore: fmt::Debug + Send + Sync {
    fn get(&self, owner: OwnerId, relation: &str) -> Result<BTreeSet<u64>, BackendError>;
    /// Replaces the whole set: clear, then insert.
    fn replace(
        &self,
        owner: OwnerId,
        relation: &str,
        members: &BTreeSet<u64>,
    ) -> Result<(), BackendError>;
}

/// Physical backends the strategies are built on.
#[derive(Debug, Clone)]
pub struct Backends {
    pub values: Arc<dyn KeyValueStore>,
    pub members: Arc<dyn MembershipStore>,
}

impl Backends {
    pub fn new(values: Arc<dyn KeyValueStore>, members: Arc<dyn MembershipStore>) -> Self {
        Self { values, members }
    }

    /// Both backends served by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            values: store.clone(),
            members: store,
        }
    }

    pub fn file(store: Arc<FileStore>) -> Self {
        Self {
            values: store.clone(),
            members: store,
        }
    }
}

/// Routes each field key to the strategy chosen by its definition, so callers
/// never see the physical layout.
#[derive(Debug, Default)]
pub struct Persistence {
    routes: BTreeMap<String, Box<dyn Datastore>>,
}

impl Persistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, key: impl Into<String>, strategy: Box<dyn Datastore>) -> &mut Self {
        self.routes.insert(key.into(), strategy);
        self
    }

    /// Builds routes from field definitions; transient fields get no route.
    pub fn for_fields<'a, I>(fields: I, backends: &Backends) -> Self
    where
        I: IntoIterator<Item = &'a FieldDefinition>,
    {
        let mut persistence = Self::new();
        for field in fields {
            if let Some(strategy) = strategy_for(field, backends) {
                persistence.route(field.key.clone(), strategy);
            }
        }
        persistence
    }

    pub fn handles(&self, key: &str) -> bool {
        self.routes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn load(&self, owner: OwnerId, key: &str) -> Value {
        match self.routes.get(key) {
            Some(strategy) => strategy.load(owner, key),
            None => Value::Null,
        }
    }

    /// Writes through the routed strategy; unrouted keys are skipped.
    pub fn save(&self, owner: OwnerId, key: &str, value: &Value) -> Result<bool, PersistenceError> {
        match self.routes.get(key) {
            Some(strategy) => strategy.save(owner, key, value).map(|()| true),
            None => {
                tracing::debug!(%owner, key, "no storage route, value not persisted");
                Ok(false)
            }
        }
    }

    pub fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError> {
        match self.routes.get(key) {
            Some(strategy) => strategy.delete(owner, key),
            None => Ok(()),
        }
    }
}

fn strategy_for(field: &FieldDefinition, backends: &Backends) -> Option<Box<dyn Datastore>> {
    let strategy: Box<dyn Datastore> = match &field.storage {
        StorageSpec::Row => Box::new(RowStrategy::new(backends.values.clone())),
        StorageSpec::Blob { row } => Box::new(BlobStrategy::new(backends.values.clone(), row)),
        StorageSpec::Terms { relation } => {
            Box::new(AssociationStrategy::new(backends.members.clone(), relation))
        }
        StorageSpec::Composite { preset, parts } => {
            let inner: Arc<dyn Datastore> = Arc::new(RowStrategy::new(backends.values.clone()));
            let strategy = match preset {
                Some(preset) => CompositeStrategy::preset(*preset, &field.key, inner),
                None => CompositeStrategy::new(
                    parts.iter().map(CompositePart::from_spec).collect(),
                    inner,
                ),
            };
            Box::new(strategy)
        }
        StorageSpec::Transient => return None,
    };
    Some(strategy)
}
