use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Number, Value, json};

use crate::field::{Field, FieldType, base_descriptor, is_empty, sanitize_text, strip_tags};
use crate::spec::field::FieldDefinition;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").expect("static regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("static regex"));

pub fn is_email(text: &str) -> bool {
    EMAIL.is_match(text)
}

fn text_value(text: String) -> Value {
    Value::String(text)
}

fn as_text(field: &Field) -> Option<&str> {
    field.value().as_str().filter(|text| !text.is_empty())
}

fn sanitize_scalar_or_list(definition: &FieldDefinition, raw: Option<&Value>) -> Value {
    if definition.multiple {
        return crate::field::sanitize_list(raw, |item| {
            let text = sanitize_text(Some(item));
            (!text.is_empty()).then(|| text_value(text))
        });
    }
    text_value(sanitize_text(raw))
}

/// Single-line text; markup stripped and whitespace trimmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextField;

impl FieldType for TextField {
    fn name(&self) -> &'static str {
        "text"
    }

    fn sanitize(&self, definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        sanitize_scalar_or_list(definition, raw)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let max = field.definition().attribute_u64("maxlength")?;
        let text = as_text(field)?;
        (text.chars().count() as u64 > max)
            .then(|| format!("{{{{label}}}} must be at most {max} characters"))
    }
}

/// Multi-line text; keeps line breaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextareaField;

impl FieldType for TextareaField {
    fn name(&self) -> &'static str {
        "textarea"
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        match raw {
            Some(Value::String(text)) => {
                let lines: Vec<String> = strip_tags(text)
                    .replace("\r\n", "\n")
                    .lines()
                    .map(|line| line.trim_end().to_string())
                    .collect();
                text_value(lines.join("\n").trim().to_string())
            }
            other => text_value(sanitize_text(other)),
        }
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        TextField.validate_type(field)
    }
}

/// Secret input; the value is kept verbatim apart from a trailing newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct PasswordField;

impl FieldType for PasswordField {
    fn name(&self) -> &'static str {
        "password"
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        match raw {
            Some(Value::String(text)) => text_value(text.trim_end_matches(['\r', '\n']).to_string()),
            _ => text_value(String::new()),
        }
    }

    fn validate_type(&self, _field: &Field) -> Option<String> {
        None
    }

    fn render(&self, field: &Field) -> Value {
        let mut descriptor = base_descriptor(self.widget(), field);
        if let Some(map) = descriptor.as_object_mut() {
            map.insert("value".into(), Value::Null);
        }
        descriptor
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmailField;

impl FieldType for EmailField {
    fn name(&self) -> &'static str {
        "email"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({ "type": "string", "format": "email" })
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        let text: String = sanitize_text(raw)
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect();
        text_value(text)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let text = as_text(field)?;
        (!is_email(text)).then(|| "{{label}} must be a valid email address".to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UrlField;

impl FieldType for UrlField {
    fn name(&self) -> &'static str {
        "url"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({ "type": "string", "format": "uri" })
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        text_value(sanitize_text(raw).replace(' ', "%20"))
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let text = as_text(field)?;
        (!URL.is_match(text)).then(|| "{{label}} must be a valid URL".to_string())
    }
}

/// Numeric input; numeric strings are converted, `min`/`max` attributes are enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberField;

impl NumberField {
    fn parse(text: &str) -> Option<Value> {
        if let Ok(integer) = text.parse::<i64>() {
            return Some(Value::Number(integer.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }
}

impl FieldType for NumberField {
    fn name(&self) -> &'static str {
        "number"
    }

    fn value_schema(&self, definition: &FieldDefinition) -> Value {
        let mut schema = json!({ "type": ["number", "string"] });
        if let Some(min) = definition.attribute_f64("min") {
            schema["minimum"] = json!(min);
        }
        if let Some(max) = definition.attribute_f64("max") {
            schema["maximum"] = json!(max);
        }
        schema
    }

    fn sanitize(&self, _definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        match raw {
            Some(Value::Number(number)) => Value::Number(number.clone()),
            Some(Value::String(text)) => {
                let text = strip_tags(text).trim().to_string();
                if text.is_empty() {
                    Value::Null
                } else {
                    // Unparseable input is kept so validation can report it.
                    Self::parse(&text).unwrap_or(Value::String(text))
                }
            }
            _ => Value::Null,
        }
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        let value = field.value();
        if is_empty(value) {
            return None;
        }
        let Some(number) = value.as_f64() else {
            return Some("{{label}} must be a number".into());
        };
        let definition = field.definition();
        if let Some(min) = definition.attribute_f64("min")
            && number < min
        {
            return Some(format!("{{{{label}}}} must be at least {min}"));
        }
        if let Some(max) = definition.attribute_f64("max")
            && number > max
        {
            return Some(format!("{{{{label}}}} must be at most {max}"));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_parses_strings() {
        let definition = FieldDefinition::new("price", "number");
        assert_eq!(NumberField.sanitize(&definition, Some(&json!(" 42 "))), json!(42));
        assert_eq!(NumberField.sanitize(&definition, Some(&json!("2.5"))), json!(2.5));
        assert_eq!(NumberField.sanitize(&definition, Some(&json!("abc"))), json!("abc"));
        assert_eq!(NumberField.sanitize(&definition, Some(&json!([1]))), Value::Null);
    }

    #[test]
    fn textarea_keeps_lines() {
        let definition = FieldDefinition::new("about", "textarea");
        let value = TextareaField.sanitize(&definition, Some(&json!("  one <i>x</i>\r\ntwo  \n")));
        assert_eq!(value, json!("one x\ntwo"));
    }

    #[test]
    fn email_shape() {
        assert!(is_email("a@b.com"));
        assert!(!is_email("not-an-email"));
        assert!(!is_email("a@b"));
    }
}
