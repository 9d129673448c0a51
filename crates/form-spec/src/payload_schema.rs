use serde_json::{Map, Value, json};

use crate::env::FormEnvironment;
use crate::spec::field::FieldDefinition;
use crate::spec::form::FormSchema;

/// JSON Schema describing the payload a form accepts. Each property comes
/// from the field type registered under the field's kind.
pub fn generate(schema: &FormSchema, env: &FormEnvironment) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in &schema.fields {
        let field_type = env.types.resolve(&field.kind);
        let property = with_label(field, field_type.payload_schema(field));
        properties.insert(field.key.clone(), property);
        if field.required {
            required.push(Value::String(field.key.clone()));
        }
    }

    let mut root = json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": format!("urn:directory-forms:{}", schema.id),
        "type": "object",
        "properties": properties,
    });
    if let Some(title) = &schema.title {
        root["title"] = Value::String(title.clone());
    }
    if !required.is_empty() {
        root["required"] = Value::Array(required);
    }
    root
}

/// Plain string value, constrained by choices and `maxlength` when present.
pub(crate) fn string_schema(field: &FieldDefinition) -> Value {
    let mut schema = json!({ "type": "string" });
    if !field.choices.is_empty() {
        schema["enum"] = json!(field.choices);
    }
    if let Some(max) = field.attribute_u64("maxlength") {
        schema["maxLength"] = json!(max);
    }
    schema
}

fn with_label(field: &FieldDefinition, mut schema: Value) -> Value {
    schema["title"] = Value::String(field.display_label().to_string());
    if let Some(description) = &field.description {
        schema["description"] = Value::String(description.clone());
    }
    schema
}
