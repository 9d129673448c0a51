use std::sync::Arc;

use crate::field::{FieldType, TypeRegistry};
use crate::filters::Filters;
use crate::rule::{Verifier, VerifierRegistry};
use crate::template::MessageRenderer;
use crate::validate::TermCatalog;

/// Per-request dependencies handed to forms and wizards at construction.
#[derive(Debug, Default)]
pub struct FormEnvironment {
    pub types: TypeRegistry,
    pub verifiers: VerifierRegistry,
    pub filters: Filters,
    pub terms: Option<Arc<dyn TermCatalog>>,
    pub messages: MessageRenderer,
}

impl FormEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type<T>(mut self, name: impl Into<String>, field_type: T) -> Self
    where
        T: FieldType + 'static,
    {
        self.types.register(name, field_type);
        self
    }

    pub fn with_verifier<V>(mut self, name: impl Into<String>, verifier: V) -> Self
    where
        V: Verifier + 'static,
    {
        self.verifiers.register(name, verifier);
        self
    }

    pub fn with_terms(mut self, catalog: Arc<dyn TermCatalog>) -> Self {
        self.terms = Some(catalog);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
