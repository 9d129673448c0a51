use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::datastore::{Datastore, MembershipStore, OwnerId};
use crate::error::PersistenceError;
use crate::field::TermsField;

/// Field value is the owner's membership set in `relation` (categories, tags).
#[derive(Debug, Clone)]
pub struct AssociationStrategy {
    store: Arc<dyn MembershipStore>,
    relation: String,
}

impl AssociationStrategy {
    pub fn new(store: Arc<dyn MembershipStore>, relation: impl Into<String>) -> Self {
        Self {
            store,
            relation: relation.into(),
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    fn members(value: &Value) -> BTreeSet<u64> {
        match value {
            Value::Array(items) => items.iter().filter_map(TermsField::term_id).collect(),
            other => TermsField::term_id(other).into_iter().collect(),
        }
    }
}

impl Datastore for AssociationStrategy {
    fn load(&self, owner: OwnerId, _key: &str) -> Value {
        match self.store.get(owner, &self.relation) {
            Ok(members) => Value::Array(members.into_iter().map(Value::from).collect()),
            Err(err) => {
                tracing::warn!(%owner, relation = %self.relation, error = %err, "membership read failed");
                Value::Array(Vec::new())
            }
        }
    }

    fn save(&self, owner: OwnerId, key: &str, value: &Value) -> Result<(), PersistenceError> {
        let members = Self::members(value);
        tracing::debug!(%owner, relation = %self.relation, count = members.len(), "replacing membership");
        self.store
            .replace(owner, &self.relation, &members)
            .map_err(|err| PersistenceError::backend(owner, key, err))
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError> {
        self.save(owner, key, &Value::Array(Vec::new()))
    }
}
