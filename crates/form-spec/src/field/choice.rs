use serde_json::{Value, json};

use crate::field::{Field, FieldType, base_descriptor, is_empty, sanitize_list, sanitize_text};
use crate::spec::field::FieldDefinition;

fn choice_items(field: &Field) -> Vec<&str> {
    match field.value() {
        Value::String(text) if !text.is_empty() => vec![text.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn check_choices(field: &Field) -> Option<String> {
    let choices = &field.definition().choices;
    if choices.is_empty() || is_empty(field.value()) {
        return None;
    }
    choice_items(field)
        .into_iter()
        .any(|item| !choices.iter().any(|choice| choice == item))
        .then(|| "{{label}} contains an invalid option".to_string())
}

fn sanitize_choices(raw: Option<&Value>) -> Value {
    sanitize_list(raw, |item| {
        let text = sanitize_text(Some(item));
        (!text.is_empty()).then_some(Value::String(text))
    })
}

/// Boolean toggle; common truthy form encodings map to `true`, anything else to `false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckboxField;

impl FieldType for CheckboxField {
    fn name(&self) -> &'static str {
        "checkbox"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({ "type": ["boolean", "string", "integer"] })
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        let checked = match raw {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value != 0.0),
            Some(Value::String(text)) => matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "1" | "on" | "yes" | "true"
            ),
            _ => false,
        };
        Value::Bool(checked)
    }

    fn validate_type(&self, _field: &Field) -> Option<String> {
        None
    }
}

/// Dropdown; becomes multi-valued when the definition sets `multiple`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectField;

impl FieldType for SelectField {
    fn name(&self) -> &'static str {
        "select"
    }

    fn sanitize(&self, definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        if definition.multiple {
            sanitize_choices(raw)
        } else {
            Value::String(sanitize_text(raw))
        }
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        check_choices(field)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RadioField;

impl FieldType for RadioField {
    fn name(&self) -> &'static str {
        "radio"
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        false
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        Value::String(sanitize_text(raw))
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        check_choices(field)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MultiSelectField;

impl FieldType for MultiSelectField {
    fn name(&self) -> &'static str {
        "multiselect"
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        true
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        sanitize_choices(raw)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        check_choices(field)
    }
}

/// Group of checkboxes over `choices`; the value is the list of checked options.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiCheckboxField;

impl FieldType for MultiCheckboxField {
    fn name(&self) -> &'static str {
        "multicheckbox"
    }

    fn is_multiple(&self, _definition: &FieldDefinition) -> bool {
        true
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        sanitize_choices(raw)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        check_choices(field)
    }

    fn render(&self, field: &Field) -> Value {
        let mut descriptor = base_descriptor(self.widget(), field);
        let checked = choice_items(field);
        let options: Vec<Value> = field
            .definition()
            .choices
            .iter()
            .map(|choice| json!({ "value": choice, "checked": checked.contains(&choice.as_str()) }))
            .collect();
        if let Some(map) = descriptor.as_object_mut() {
            map.insert("options".into(), Value::Array(options));
        }
        descriptor
    }
}
