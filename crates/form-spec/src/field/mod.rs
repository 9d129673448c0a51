pub mod choice;
pub mod composite;
pub mod registry;
pub mod text;
pub mod upload;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::rule::Rule;
use crate::spec::field::FieldDefinition;

pub use choice::{CheckboxField, MultiCheckboxField, MultiSelectField, RadioField, SelectField};
pub use composite::{GeolocationField, OpeningHoursField, TermsField, Weekday, weekday_from_key};
pub use registry::TypeRegistry;
pub use text::{EmailField, NumberField, PasswordField, TextField, TextareaField, UrlField};
pub use upload::{FileField, UploadedFile};

static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]*>").expect("static regex")
});

/// Capability set every field type provides. Implementations are resolved
/// from a [`TypeRegistry`] when a form is constructed.
pub trait FieldType: fmt::Debug + Send + Sync {
    /// Registry name, e.g. `"email"`.
    fn name(&self) -> &'static str;

    /// Widget hint carried by render descriptors.
    fn widget(&self) -> &'static str {
        self.name()
    }

    fn is_multiple(&self, definition: &FieldDefinition) -> bool {
        definition.multiple
    }

    /// Normalizes a submitted value. Wrong shapes degrade to an empty value.
    fn sanitize(&self, definition: &FieldDefinition, raw: Option<&Value>) -> Value;

    /// Returns a message template when a non-empty value has the wrong shape.
    fn validate_type(&self, field: &Field) -> Option<String>;

    /// JSON Schema of one submitted value.
    fn value_schema(&self, definition: &FieldDefinition) -> Value {
        crate::payload_schema::string_schema(definition)
    }

    /// JSON Schema of the payload entry, an array of values for multi-valued types.
    fn payload_schema(&self, definition: &FieldDefinition) -> Value {
        let item = self.value_schema(definition);
        if self.is_multiple(definition) {
            json!({ "type": "array", "items": item })
        } else {
            item
        }
    }

    /// Structured widget descriptor for the surrounding renderer.
    fn render(&self, field: &Field) -> Value {
        base_descriptor(self.widget(), field)
    }
}

/// Runtime field: a definition, its resolved type, its rules and the current value.
#[derive(Debug, Clone)]
pub struct Field {
    definition: FieldDefinition,
    kind: Arc<dyn FieldType>,
    rules: Vec<Rule>,
    value: Value,
    errors: Vec<String>,
}

impl Field {
    pub fn new(definition: FieldDefinition, kind: Arc<dyn FieldType>, rules: Vec<Rule>) -> Self {
        let value = initial_value(&definition, kind.as_ref());
        Self {
            definition,
            kind,
            rules,
            value,
            errors: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn label(&self) -> &str {
        self.definition.display_label()
    }

    pub fn definition(&self) -> &FieldDefinition {
        &self.definition
    }

    pub fn kind(&self) -> &dyn FieldType {
        self.kind.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.definition.required
    }

    pub fn is_multiple(&self) -> bool {
        self.kind.is_multiple(&self.definition)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Sanitizes and stores a submitted value. Returns whether the value changed.
    pub fn bind(&mut self, raw: Option<&Value>) -> bool {
        let value = self.kind.sanitize(&self.definition, raw);
        self.set_value(value)
    }

    /// Stores a value as-is. Returns whether the value changed.
    pub fn set_value(&mut self, value: Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub(crate) fn reset(&mut self) {
        self.value = initial_value(&self.definition, self.kind.as_ref());
        self.errors.clear();
    }

    pub fn render(&self) -> Value {
        self.kind.render(self)
    }

    /// Data handed to message templates.
    pub fn message_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("key".into(), Value::String(self.key().to_string()));
        data.insert("label".into(), Value::String(self.label().to_string()));
        data.insert("value".into(), self.value.clone());
        data
    }
}

fn initial_value(definition: &FieldDefinition, kind: &dyn FieldType) -> Value {
    match &definition.default_value {
        Some(value) => value.clone(),
        None if kind.is_multiple(definition) => Value::Array(Vec::new()),
        None => Value::Null,
    }
}

/// Null, blank strings, `false`, and empty arrays/objects count as empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_empty),
        Value::Number(_) => false,
    }
}

pub fn strip_tags(input: &str) -> String {
    TAGS.replace_all(input, "").into_owned()
}

/// Scalar-to-text conversion shared by text-like types: strips markup, trims,
/// and maps non-scalar payloads to an empty string.
pub fn sanitize_text(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(text)) => strip_tags(text).trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

/// Applies `item` to every element of an array payload; anything else is `[]`.
pub fn sanitize_list<F>(raw: Option<&Value>, item: F) -> Value
where
    F: Fn(&Value) -> Option<Value>,
{
    let items = match raw {
        Some(Value::Array(items)) => items.iter().filter_map(item).collect(),
        _ => Vec::new(),
    };
    Value::Array(items)
}

pub(crate) fn base_descriptor(widget: &str, field: &Field) -> Value {
    let definition = field.definition();
    let mut descriptor = json!({
        "key": field.key(),
        "type": definition.kind,
        "widget": widget,
        "label": field.label(),
        "required": field.is_required(),
        "multiple": field.is_multiple(),
        "value": field.value(),
        "errors": field.errors(),
    });
    if let Some(map) = descriptor.as_object_mut() {
        if let Some(description) = &definition.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        if !definition.choices.is_empty() {
            map.insert("choices".into(), json!(definition.choices));
        }
        if !definition.attributes.is_empty() {
            map.insert("attributes".into(), json!(definition.attributes));
        }
    }
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_drops_markup_and_scripts() {
        assert_eq!(
            strip_tags("<b>Bold</b> <script>alert(1)</script>text"),
            "Bold text"
        );
    }

    #[test]
    fn emptiness_covers_blank_and_false() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!("   ")));
        assert!(is_empty(&json!(false)));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({ "address": "", "lat": null })));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(["a"])));
    }

    #[test]
    fn sanitize_list_rejects_scalars() {
        let value = sanitize_list(Some(&json!("a")), |item| Some(item.clone()));
        assert_eq!(value, json!([]));
    }
}
