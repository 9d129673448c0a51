use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::changeset::Changeset;
use crate::datastore::{OwnerId, Persistence};
use crate::env::FormEnvironment;
use crate::error::{PersistenceError, SchemaError};
use crate::field::{Field, is_empty};
use crate::filters::{FORM_FIELDS, FORM_VALUES};
use crate::rule::{Rule, RuleContext};
use crate::spec::field::FieldDefinition;
use crate::spec::form::FormSchema;
use crate::validate::{FormValidator, build_validators};

pub const REQUIRED_MESSAGE: &str = "{{label}} is a required field";

/// Ordered collection of runtime fields bound from one request payload.
#[derive(Debug)]
pub struct Form {
    id: String,
    title: Option<String>,
    fields: Vec<Field>,
    validators: Vec<Box<dyn FormValidator>>,
    form_errors: Vec<String>,
    changes: Changeset,
    env: Arc<FormEnvironment>,
}

impl Form {
    pub fn from_schema(schema: &FormSchema, env: &Arc<FormEnvironment>) -> Result<Self, SchemaError> {
        let mut form = Self::new(&schema.id, schema.fields.clone(), env)?;
        form.title = schema.title.clone();
        for spec in &schema.validators {
            if form.field(spec.field()).is_none() {
                return Err(SchemaError::UnknownValidatorField(spec.field().to_string()));
            }
        }
        form.validators = build_validators(&schema.validators, env)?;
        Ok(form)
    }

    /// Builds fields in priority order; equal priorities keep definition order.
    pub fn new(
        id: impl Into<String>,
        definitions: Vec<FieldDefinition>,
        env: &Arc<FormEnvironment>,
    ) -> Result<Self, SchemaError> {
        let id = id.into();
        let mut definitions = filter_definitions(&id, definitions, env);

        let mut seen = BTreeSet::new();
        for definition in &definitions {
            if !seen.insert(definition.key.as_str()) {
                return Err(SchemaError::DuplicateField(definition.key.clone()));
            }
        }

        definitions.sort_by_key(|definition| definition.priority);

        let fields = definitions
            .into_iter()
            .map(|definition| {
                let rules = definition
                    .rules
                    .iter()
                    .map(|rule| Rule::from_spec(rule, &definition.key, &env.verifiers))
                    .collect::<Result<Vec<_>, _>>()?;
                let kind = env.types.resolve(&definition.kind);
                Ok(Field::new(definition, kind, rules))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        Ok(Self {
            id,
            title: None,
            fields,
            validators: Vec::new(),
            form_errors: Vec::new(),
            changes: Changeset::default(),
            env: Arc::clone(env),
        })
    }

    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: FormValidator + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.key() == key)
    }

    pub fn field_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.key() == key)
    }

    pub fn field_value(&self, key: &str) -> Option<&Value> {
        self.field(key).map(Field::value)
    }

    /// Sanitizes and stores every field's submitted value; missing keys bind empty.
    pub fn bind(&mut self, payload: &Value) {
        self.bind_matching(payload, |_| true);
    }

    /// Like [`Form::bind`] but only touches `keys`.
    pub fn bind_only(&mut self, payload: &Value, keys: &[String]) {
        self.bind_matching(payload, |key| keys.iter().any(|candidate| candidate == key));
    }

    fn bind_matching<P>(&mut self, payload: &Value, include: P)
    where
        P: Fn(&str) -> bool,
    {
        let empty = Map::new();
        let submitted = payload.as_object().unwrap_or(&empty);
        self.form_errors.clear();
        for field in self.fields.iter_mut().filter(|field| include(field.key())) {
            field.clear_errors();
            if field.bind(submitted.get(field.key())) {
                self.changes.record(field.key(), field.value().clone());
            }
        }
    }

    /// Stores a value without sanitizing it and records the change.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<(), SchemaError> {
        let field = self
            .field_mut(key)
            .ok_or_else(|| SchemaError::UnknownField(key.to_string()))?;
        if field.set_value(value) {
            let current = field.value().clone();
            self.changes.record(key, current);
        }
        Ok(())
    }

    /// Validates every field, then the form-level validators.
    pub fn is_valid(&mut self) -> bool {
        let keys: Vec<String> = self.fields.iter().map(|f| f.key().to_string()).collect();
        self.run_validation(&keys, true)
    }

    /// Validates `keys` only; form-level validators guarding one of them run too.
    pub fn validate_only(&mut self, keys: &[String]) -> bool {
        self.run_validation(keys, false)
    }

    fn run_validation(&mut self, keys: &[String], whole_form: bool) -> bool {
        let outcomes: Vec<(usize, Option<String>)> = {
            let ctx = RuleContext::new(&self.fields);
            self.fields
                .iter()
                .enumerate()
                .filter(|(_, field)| keys.iter().any(|key| key == field.key()))
                .map(|(index, field)| (index, self.check_field(field, &ctx)))
                .collect()
        };

        let mut valid = true;
        for (index, failure) in outcomes {
            let field = &mut self.fields[index];
            field.clear_errors();
            if let Some(message) = failure {
                field.add_error(message);
                valid = false;
            }
        }
        self.form_errors.clear();
        if !valid {
            return false;
        }

        let failure = self
            .validators
            .iter()
            .filter(|validator| match validator.field() {
                Some(field) => keys.iter().any(|key| key == field),
                None => whole_form,
            })
            .find_map(|validator| validator.validate(self).err());
        if let Some(message) = failure {
            tracing::debug!(form = %self.id, %message, "form-level validation vetoed submission");
            self.form_errors.push(message);
            return false;
        }
        true
    }

    /// Required check, then type shape, then rules in order; first failure wins.
    fn check_field(&self, field: &Field, ctx: &RuleContext<'_>) -> Option<String> {
        let value = field.value();
        let data = |rule: Option<&Rule>| {
            let mut data = field.message_data();
            if let Some(rule) = rule {
                data.extend(rule.params());
            }
            Value::Object(data)
        };

        if is_empty(value) {
            if field.is_required() {
                return Some(self.env.messages.render(REQUIRED_MESSAGE, &data(None)));
            }
        } else if let Some(template) = field.kind().validate_type(field) {
            return Some(self.env.messages.render(&template, &data(None)));
        }

        let empty = is_empty(value);
        field
            .rules()
            .iter()
            .filter(|rule| !(empty && rule.checks_shape()))
            .find(|rule| !rule.validate(field, ctx))
            .map(|rule| {
                let failing = rule.failing_rule(field, ctx);
                self.env.messages.render(failing.message(), &data(Some(failing)))
            })
    }

    /// Field errors keyed by field key; fields without errors are omitted.
    pub fn errors(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter(|field| field.has_errors())
            .map(|field| (field.key().to_string(), field.errors().to_vec()))
            .collect()
    }

    pub fn form_errors(&self) -> &[String] {
        &self.form_errors
    }

    /// Renders a message template with the form's configured renderer.
    pub fn render_message(&self, template: &str, data: &Value) -> String {
        self.env.messages.render(template, data)
    }

    pub fn add_form_error(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.form_errors.is_empty() || self.fields.iter().any(Field::has_errors)
    }

    pub fn to_array(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| (field.key().to_string(), field.value().clone()))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_array())
    }

    /// Restores defaults and drops errors and pending changes.
    pub fn reset(&mut self) {
        for field in &mut self.fields {
            field.reset();
        }
        self.form_errors.clear();
        self.changes.clear();
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changes
    }

    /// Applies previously carried values, recording the ones that differ.
    pub fn restore(&mut self, values: &Value) {
        let Some(values) = values.as_object() else {
            return;
        };
        for field in &mut self.fields {
            if let Some(value) = values.get(field.key())
                && field.set_value(value.clone())
            {
                self.changes.record(field.key(), value.clone());
            }
        }
    }

    /// Fills routed fields from storage without recording changes.
    pub fn load(&mut self, owner: OwnerId, persistence: &Persistence) {
        for field in &mut self.fields {
            if !persistence.handles(field.key()) {
                continue;
            }
            let value = persistence.load(owner, field.key());
            if !value.is_null() {
                field.set_value(value);
            }
        }
    }

    /// Writes pending changes through `persistence` and clears them.
    ///
    /// The `form.values` filter sees the pending map first. On failure the
    /// changeset is kept; writes that already happened are not undone.
    pub fn save(&mut self, owner: OwnerId, persistence: &Persistence) -> Result<usize, PersistenceError> {
        if self.changes.is_empty() {
            return Ok(0);
        }
        let pending = Value::Object(self.changes.to_map());
        let ctx = json!({ "form": self.id, "owner": owner });
        let filtered = self.env.filters.apply(FORM_VALUES, pending, &ctx);
        let filtered = filtered.as_object().cloned().unwrap_or_default();

        let mut written = 0;
        for (key, _) in self.changes.iter() {
            let Some(value) = filtered.get(key) else {
                continue;
            };
            if persistence.save(owner, key, value)? {
                written += 1;
            }
        }
        tracing::debug!(form = %self.id, %owner, written, "saved pending changes");
        self.changes.clear();
        Ok(written)
    }
}

fn filter_definitions(
    form: &str,
    definitions: Vec<FieldDefinition>,
    env: &FormEnvironment,
) -> Vec<FieldDefinition> {
    if !env.filters.has(FORM_FIELDS) {
        return definitions;
    }
    let seed = match serde_json::to_value(&definitions) {
        Ok(seed) => seed,
        Err(err) => {
            tracing::warn!(%form, error = %err, "cannot expose field definitions to filters");
            return definitions;
        }
    };
    let filtered = env.filters.apply(FORM_FIELDS, seed, &json!({ "form": form }));
    match serde_json::from_value(filtered) {
        Ok(filtered) => filtered,
        Err(err) => {
            tracing::warn!(%form, error = %err, "field filter produced invalid definitions");
            definitions
        }
    }
}
