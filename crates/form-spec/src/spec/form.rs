use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::spec::field::FieldDefinition;

/// Top-level declarative form: an ordered map of field definitions plus
/// form-level validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormSchema {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Document order is preserved and breaks priority ties.
    #[serde(with = "ordered_fields")]
    #[schemars(with = "std::collections::BTreeMap<String, FieldDefinition>")]
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ValidatorSpec>,
}

impl FormSchema {
    pub fn new(id: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            id: id.into(),
            title: None,
            fields,
            validators: Vec::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.key == key)
    }
}

/// Cross-field checks that run after per-field validation succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidatorSpec {
    /// Every term id submitted in `field` must exist in `relation`.
    RequiredTerms { field: String, relation: String },
    /// Uploaded files in `field` must match one of the `allow` globs
    /// (mime type or file name), optionally only while `when` holds.
    FileTypes {
        field: String,
        allow: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ValidatorSpec {
    pub fn field(&self) -> &str {
        match self {
            ValidatorSpec::RequiredTerms { field, .. } | ValidatorSpec::FileTypes { field, .. } => {
                field
            }
        }
    }
}

/// Serializes `Vec<FieldDefinition>` as a `key -> definition` map while keeping
/// the document order on the way in.
mod ordered_fields {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use crate::spec::field::FieldDefinition;

    pub fn serialize<S>(fields: &[FieldDefinition], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(&field.key, field)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<FieldDefinition>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(FieldsVisitor)
    }

    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<FieldDefinition>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of field key to field definition")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, mut field)) = access.next_entry::<String, FieldDefinition>()? {
                field.key = key;
                fields.push(field);
            }
            Ok(fields)
        }
    }
}
