use std::collections::BTreeMap;
use std::sync::Arc;

use crate::field::{
    CheckboxField, EmailField, FieldType, FileField, GeolocationField, MultiCheckboxField,
    MultiSelectField, NumberField, OpeningHoursField, PasswordField, RadioField, SelectField,
    TermsField, TextField, TextareaField, UrlField,
};

/// Maps type names to field implementations. Unknown names resolve to plain text.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<dyn FieldType>>,
    fallback: Arc<dyn FieldType>,
}

impl TypeRegistry {
    /// Registry without any registered type; everything resolves to text.
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
            fallback: Arc::new(TextField),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register("text", TextField)
            .register("textarea", TextareaField)
            .register("password", PasswordField)
            .register("email", EmailField)
            .register("url", UrlField)
            .register("number", NumberField)
            .register("checkbox", CheckboxField)
            .register("select", SelectField)
            .register("dropdown", SelectField)
            .register("radio", RadioField)
            .register("multiselect", MultiSelectField)
            .register("multicheckbox", MultiCheckboxField)
            .register("file", FileField)
            .register("geolocation", GeolocationField)
            .register("opening_hours", OpeningHoursField)
            .register("terms", TermsField);
        registry
    }

    /// Registers (or replaces) the implementation for `name`.
    pub fn register<T>(&mut self, name: impl Into<String>, field_type: T) -> &mut Self
    where
        T: FieldType + 'static,
    {
        self.types.insert(name.into(), Arc::new(field_type));
        self
    }

    pub fn resolve(&self, name: &str) -> Arc<dyn FieldType> {
        match self.types.get(name) {
            Some(field_type) => Arc::clone(field_type),
            None => {
                tracing::debug!(field_type = name, "unregistered field type, using text");
                Arc::clone(&self.fallback)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_fall_back_to_text() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(registry.resolve("hologram").name(), "text");
        assert_eq!(registry.resolve("dropdown").name(), "select");
        assert!(!registry.contains("hologram"));
        assert!(registry.names().any(|name| name == "opening_hours"));
    }

    #[test]
    fn registration_overrides_defaults() {
        let mut registry = TypeRegistry::with_defaults();
        registry.register("email", UrlField);
        assert_eq!(registry.resolve("email").name(), "url");
    }
}
