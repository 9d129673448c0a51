use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::env::FormEnvironment;
use crate::error::SchemaError;
use crate::expr::Expr;
use crate::field::{TermsField, UploadedFile};
use crate::form::Form;
use crate::spec::form::{FormSchema, ValidatorSpec};

/// Per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Outcome of validating a whole payload against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_form(form: &Form, valid: bool) -> Self {
        let errors = form
            .fields()
            .iter()
            .flat_map(|field| {
                field.errors().iter().map(|message| ValidationError {
                    field: field.key().to_string(),
                    message: message.clone(),
                })
            })
            .collect();
        Self {
            valid,
            errors,
            form_errors: form.form_errors().to_vec(),
        }
    }
}

/// Builds a form from `schema`, binds `payload` and validates it.
pub fn validate(
    schema: &FormSchema,
    payload: &Value,
    env: &Arc<FormEnvironment>,
) -> Result<ValidationResult, SchemaError> {
    let mut form = Form::from_schema(schema, env)?;
    form.bind(payload);
    let valid = form.is_valid();
    Ok(ValidationResult::from_form(&form, valid))
}

/// Lookup of existing taxonomy terms.
pub trait TermCatalog: fmt::Debug + Send + Sync {
    fn exists(&self, relation: &str, term: u64) -> bool;
}

/// Fixed term catalog, e.g. loaded from request context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTerms(pub BTreeMap<String, BTreeSet<u64>>);

impl StaticTerms {
    pub fn with<I>(mut self, relation: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        self.0.entry(relation.into()).or_default().extend(terms);
        self
    }
}

impl TermCatalog for StaticTerms {
    fn exists(&self, relation: &str, term: u64) -> bool {
        self.0.get(relation).is_some_and(|terms| terms.contains(&term))
    }
}

/// Cross-field check run after per-field validation passes. A failure vetoes
/// the submission with a single form-level message.
pub trait FormValidator: fmt::Debug + Send + Sync {
    /// Field this validator guards; `None` means the whole form.
    fn field(&self) -> Option<&str> {
        None
    }

    fn validate(&self, form: &Form) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct RequiredTerms {
    field: String,
    relation: String,
    catalog: Arc<dyn TermCatalog>,
}

impl RequiredTerms {
    pub fn new(
        field: impl Into<String>,
        relation: impl Into<String>,
        catalog: Arc<dyn TermCatalog>,
    ) -> Self {
        Self {
            field: field.into(),
            relation: relation.into(),
            catalog,
        }
    }
}

impl FormValidator for RequiredTerms {
    fn field(&self) -> Option<&str> {
        Some(&self.field)
    }

    fn validate(&self, form: &Form) -> Result<(), String> {
        let Some(Value::Array(items)) = form.field_value(&self.field) else {
            return Ok(());
        };
        match items
            .iter()
            .filter_map(TermsField::term_id)
            .find(|term| !self.catalog.exists(&self.relation, *term))
        {
            Some(term) => Err(format!("Selected {} {} does not exist", self.relation, term)),
            None => Ok(()),
        }
    }
}

/// Uploaded files must match the allow-list, by mime type or by file name.
#[derive(Debug, Clone)]
pub struct AllowedFileTypes {
    field: String,
    patterns: Vec<String>,
    allow: GlobSet,
    when: Option<Expr>,
    message: Option<String>,
}

impl AllowedFileTypes {
    pub fn new(field: impl Into<String>, patterns: &[String]) -> Result<Self, SchemaError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(&pattern.to_ascii_lowercase()).map_err(|source| {
                SchemaError::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            builder.add(glob);
        }
        let allow = builder.build().map_err(|source| SchemaError::InvalidGlob {
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self {
            field: field.into(),
            patterns: patterns.to_vec(),
            allow,
            when: None,
            message: None,
        })
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn accepts(&self, file: &UploadedFile) -> bool {
        let by_mime = file
            .mime
            .as_deref()
            .is_some_and(|mime| self.allow.is_match(mime.to_ascii_lowercase()));
        let by_name = file
            .file_name()
            .is_some_and(|name| self.allow.is_match(name.to_ascii_lowercase()));
        by_mime || by_name
    }
}

impl FormValidator for AllowedFileTypes {
    fn field(&self) -> Option<&str> {
        Some(&self.field)
    }

    fn validate(&self, form: &Form) -> Result<(), String> {
        if let Some(condition) = &self.when
            && !condition.matches_values(&form.to_value())
        {
            return Ok(());
        }
        let Some(value) = form.field_value(&self.field) else {
            return Ok(());
        };
        match UploadedFile::list(value).iter().find(|file| !self.accepts(file)) {
            Some(file) => Err(self.message.clone().unwrap_or_else(|| {
                format!(
                    "{} is not an allowed file type ({})",
                    file.file_name().unwrap_or(&file.url),
                    self.patterns.join(", ")
                )
            })),
            None => Ok(()),
        }
    }
}

/// Adapts a closure into a whole-form [`FormValidator`].
pub struct FnValidator<F>(pub F);

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnValidator")
    }
}

impl<F> FormValidator for FnValidator<F>
where
    F: Fn(&Form) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, form: &Form) -> Result<(), String> {
        (self.0)(form)
    }
}

pub(crate) fn build_validators(
    specs: &[ValidatorSpec],
    env: &FormEnvironment,
) -> Result<Vec<Box<dyn FormValidator>>, SchemaError> {
    specs
        .iter()
        .map(|spec| -> Result<Box<dyn FormValidator>, SchemaError> {
            match spec {
                ValidatorSpec::RequiredTerms { field, relation } => {
                    let catalog = env
                        .terms
                        .clone()
                        .ok_or(SchemaError::MissingCollaborator("term catalog"))?;
                    Ok(Box::new(RequiredTerms::new(field, relation, catalog)))
                }
                ValidatorSpec::FileTypes {
                    field,
                    allow,
                    when,
                    message,
                } => {
                    let mut validator = AllowedFileTypes::new(field, allow)?;
                    validator.when = when.clone();
                    validator.message = message.clone();
                    Ok(Box::new(validator))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, mime: Option<&str>) -> UploadedFile {
        UploadedFile {
            url: format!("https://cdn.example/{name}"),
            path: String::new(),
            size: None,
            mime: mime.map(String::from),
        }
    }

    #[test]
    fn file_types_match_mime_or_extension() {
        let validator =
            AllowedFileTypes::new("logo", &["image/*".to_string(), "*.pdf".to_string()])
                .expect("globs");
        assert!(validator.accepts(&upload("a.bin", Some("image/png"))));
        assert!(validator.accepts(&upload("Menu.PDF", None)));
        assert!(!validator.accepts(&upload("run.exe", Some("application/x-msdownload"))));
    }

    #[test]
    fn static_terms_lookup() {
        let terms = StaticTerms::default().with("category", [1, 2]);
        assert!(terms.exists("category", 2));
        assert!(!terms.exists("category", 3));
        assert!(!terms.exists("tag", 1));
    }
}
