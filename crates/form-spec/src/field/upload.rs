use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::field::{Field, FieldType, is_empty, sanitize_text};
use crate::spec::field::FieldDefinition;

/// One uploaded item as handed over by the surrounding upload handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl UploadedFile {
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let url = sanitize_text(map.get("url"));
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url,
            path: sanitize_text(map.get("path")),
            size: map.get("size").and_then(Value::as_u64),
            mime: map
                .get("mime")
                .map(|mime| sanitize_text(Some(mime)))
                .filter(|mime| !mime.is_empty()),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("url".into(), Value::String(self.url.clone()));
        map.insert("path".into(), Value::String(self.path.clone()));
        if let Some(size) = self.size {
            map.insert("size".into(), Value::from(size));
        }
        if let Some(mime) = &self.mime {
            map.insert("mime".into(), Value::String(mime.clone()));
        }
        Value::Object(map)
    }

    /// File name taken from the local path, or from the URL when no path is known.
    pub fn file_name(&self) -> Option<&str> {
        let source = if self.path.is_empty() {
            self.url.as_str()
        } else {
            self.path.as_str()
        };
        let trimmed = source.split(['?', '#']).next().unwrap_or(source);
        Path::new(trimmed).file_name().and_then(|name| name.to_str())
    }

    /// All uploaded items held by a file field value.
    pub fn list(value: &Value) -> Vec<UploadedFile> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Object(_) => Self::from_value(value).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// Upload field; values are `{url, path, size?, mime?}` or a list of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileField;

impl FieldType for FileField {
    fn name(&self) -> &'static str {
        "file"
    }

    fn value_schema(&self, _definition: &FieldDefinition) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "path": { "type": "string" },
                "size": { "type": "integer", "minimum": 0 },
                "mime": { "type": "string" },
            },
            "required": ["url"],
        })
    }

    fn sanitize(&self, definition: &FieldDefinition, raw: Option<&Value>) -> Value {
        if definition.multiple {
            let items = match raw {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(UploadedFile::from_value)
                    .map(|file| file.to_value())
                    .collect(),
                _ => Vec::new(),
            };
            return Value::Array(items);
        }
        raw.and_then(UploadedFile::from_value)
            .map(|file| file.to_value())
            .unwrap_or(Value::Null)
    }

    fn validate_type(&self, field: &Field) -> Option<String> {
        if is_empty(field.value()) {
            return None;
        }
        let files = UploadedFile::list(field.value());
        let definition = field.definition();
        if let Some(limit) = definition.attribute_u64("max_files")
            && files.len() as u64 > limit
        {
            return Some(format!("{{{{label}}}} accepts at most {limit} files"));
        }
        let max_size = definition.attribute_u64("max_size")?;
        files
            .iter()
            .any(|file| file.size.is_some_and(|size| size > max_size))
            .then(|| "{{label}} exceeds the maximum upload size".to_string())
    }
}
