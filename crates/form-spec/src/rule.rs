use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::field::text::is_email;
use crate::field::{Field, is_empty};
use crate::spec::rule::{RuleKindSpec, RuleSpec};

/// External check used by `verify` rules, e.g. credential verification.
pub trait Verifier: fmt::Debug + Send + Sync {
    /// `with` carries the value of the companion field named by the rule, if any.
    fn verify(&self, value: &Value, with: Option<&Value>) -> bool;
}

/// Adapts a closure into a [`Verifier`].
pub struct FnVerifier<F>(pub F);

impl<F> fmt::Debug for FnVerifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnVerifier")
    }
}

impl<F> Verifier for FnVerifier<F>
where
    F: Fn(&Value, Option<&Value>) -> bool + Send + Sync,
{
    fn verify(&self, value: &Value, with: Option<&Value>) -> bool {
        (self.0)(value, with)
    }
}

/// Named verifiers available to `verify` rules.
#[derive(Debug, Clone, Default)]
pub struct VerifierRegistry {
    verifiers: BTreeMap<String, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    pub fn register<V>(&mut self, name: impl Into<String>, verifier: V) -> &mut Self
    where
        V: Verifier + 'static,
    {
        self.verifiers.insert(name.into(), Arc::new(verifier));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(name).cloned()
    }
}

/// Read access to sibling field values during rule evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    fields: &'a [Field],
}

impl<'a> RuleContext<'a> {
    pub fn new(fields: &'a [Field]) -> Self {
        Self { fields }
    }

    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .find(|field| field.key() == key)
            .map(Field::value)
    }
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    NotEmpty,
    Email,
    Regex(Regex),
    MinLength(usize),
    MaxLength(usize),
    FieldsMatch(String),
    All(Vec<Rule>),
    Any(Vec<Rule>),
    When { guard: Box<Rule>, then: Vec<Rule> },
    Verify {
        verifier: Arc<dyn Verifier>,
        with: Option<String>,
    },
}

/// A node of a field's validation tree.
///
/// Shape rules (`email`, `regex`, length bounds) accept empty values; emptiness
/// is the business of the required check and `not_empty`.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    message: Option<String>,
    negate: bool,
}

impl Rule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            message: None,
            negate: false,
        }
    }

    pub fn not_empty() -> Self {
        Self::new(RuleKind::NotEmpty)
    }

    pub fn email() -> Self {
        Self::new(RuleKind::Email)
    }

    pub fn regex(pattern: Regex) -> Self {
        Self::new(RuleKind::Regex(pattern))
    }

    pub fn min_length(min: usize) -> Self {
        Self::new(RuleKind::MinLength(min))
    }

    pub fn max_length(max: usize) -> Self {
        Self::new(RuleKind::MaxLength(max))
    }

    pub fn fields_match(other: impl Into<String>) -> Self {
        Self::new(RuleKind::FieldsMatch(other.into()))
    }

    pub fn all(rules: Vec<Rule>) -> Self {
        Self::new(RuleKind::All(rules))
    }

    pub fn any(rules: Vec<Rule>) -> Self {
        Self::new(RuleKind::Any(rules))
    }

    pub fn when(guard: Rule, then: Vec<Rule>) -> Self {
        Self::new(RuleKind::When {
            guard: Box::new(guard),
            then,
        })
    }

    pub fn verify(verifier: Arc<dyn Verifier>, with: Option<String>) -> Self {
        Self::new(RuleKind::Verify { verifier, with })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn from_spec(
        spec: &RuleSpec,
        field: &str,
        verifiers: &VerifierRegistry,
    ) -> Result<Self, SchemaError> {
        let children = |rules: &[RuleSpec]| -> Result<Vec<Rule>, SchemaError> {
            rules
                .iter()
                .map(|rule| Rule::from_spec(rule, field, verifiers))
                .collect()
        };
        let kind = match &spec.kind {
            RuleKindSpec::NotEmpty => RuleKind::NotEmpty,
            RuleKindSpec::Email => RuleKind::Email,
            RuleKindSpec::Regex { pattern } => {
                RuleKind::Regex(Regex::new(pattern).map_err(|source| {
                    SchemaError::InvalidPattern {
                        field: field.to_string(),
                        source,
                    }
                })?)
            }
            RuleKindSpec::MinLength { min } => RuleKind::MinLength(*min),
            RuleKindSpec::MaxLength { max } => RuleKind::MaxLength(*max),
            RuleKindSpec::FieldsMatch { other } => RuleKind::FieldsMatch(other.clone()),
            RuleKindSpec::All { rules } => RuleKind::All(children(rules)?),
            RuleKindSpec::Any { rules } => RuleKind::Any(children(rules)?),
            RuleKindSpec::When { guard, then } => RuleKind::When {
                guard: Box::new(Rule::from_spec(guard, field, verifiers)?),
                then: children(then)?,
            },
            RuleKindSpec::Verify { verifier, with } => RuleKind::Verify {
                verifier: verifiers
                    .get(verifier)
                    .ok_or_else(|| SchemaError::UnknownVerifier {
                        field: field.to_string(),
                        verifier: verifier.clone(),
                    })?,
                with: with.clone(),
            },
        };
        Ok(Self {
            kind,
            message: spec.message.clone(),
            negate: spec.negate,
        })
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn children(&self) -> &[Rule] {
        match &self.kind {
            RuleKind::All(rules) | RuleKind::Any(rules) => rules,
            RuleKind::When { then, .. } => then,
            _ => &[],
        }
    }

    /// The rule's own predicate, ignoring negation.
    pub fn is_valid(&self, field: &Field, ctx: &RuleContext<'_>) -> bool {
        let value = field.value();
        match &self.kind {
            RuleKind::NotEmpty => !is_empty(value),
            RuleKind::Email => texts(value).iter().all(|text| is_email(text)),
            RuleKind::Regex(pattern) => texts(value).iter().all(|text| pattern.is_match(text)),
            RuleKind::MinLength(min) => is_empty(value) || length(value) >= *min,
            RuleKind::MaxLength(max) => length(value) <= *max,
            RuleKind::FieldsMatch(other) => {
                ctx.value(other).unwrap_or(&Value::Null) == value
            }
            RuleKind::All(rules) => rules.iter().all(|rule| rule.validate(field, ctx)),
            RuleKind::Any(rules) => {
                rules.is_empty() || rules.iter().any(|rule| rule.validate(field, ctx))
            }
            RuleKind::When { guard, then } => {
                !guard.validate(field, ctx) || then.iter().all(|rule| rule.validate(field, ctx))
            }
            RuleKind::Verify { verifier, with } => {
                let with = with.as_deref().and_then(|key| ctx.value(key));
                verifier.verify(value, with)
            }
        }
    }

    /// `is_valid` with negation applied.
    pub fn validate(&self, field: &Field, ctx: &RuleContext<'_>) -> bool {
        self.is_valid(field, ctx) != self.negate
    }

    /// Shape rules judge the form of a present value. Forms skip them, negated
    /// or not, while the field is empty.
    pub fn checks_shape(&self) -> bool {
        matches!(
            self.kind,
            RuleKind::Email | RuleKind::Regex(_) | RuleKind::MinLength(_) | RuleKind::MaxLength(_)
        )
    }

    /// Message template for this rule (custom or built-in).
    pub fn message(&self) -> &str {
        if let Some(message) = &self.message {
            return message;
        }
        if self.negate {
            return "{{label}} is invalid";
        }
        match &self.kind {
            RuleKind::NotEmpty => "{{label}} must not be empty",
            RuleKind::Email => "{{label}} must be a valid email address",
            RuleKind::Regex(_) => "{{label}} has an invalid format",
            RuleKind::MinLength(_) => "{{label}} must be at least {{min}} characters",
            RuleKind::MaxLength(_) => "{{label}} must be at most {{max}} characters",
            RuleKind::FieldsMatch(_) => "{{label}} does not match {{other}}",
            RuleKind::All(_) | RuleKind::Any(_) | RuleKind::When { .. } => "{{label}} is invalid",
            RuleKind::Verify { .. } => "{{label}} could not be verified",
        }
    }

    /// The rule whose message explains a failure of `self`. Composites without a
    /// message of their own point at the first failing child.
    pub fn failing_rule<'r>(&'r self, field: &Field, ctx: &RuleContext<'_>) -> &'r Rule {
        if self.message.is_some() || self.negate {
            return self;
        }
        let candidates: &[Rule] = match &self.kind {
            RuleKind::All(rules) => rules,
            RuleKind::When { then, .. } => then,
            _ => return self,
        };
        candidates
            .iter()
            .find(|rule| !rule.validate(field, ctx))
            .map(|rule| rule.failing_rule(field, ctx))
            .unwrap_or(self)
    }

    /// Template parameters exposed next to `key`, `label` and `value`.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match &self.kind {
            RuleKind::Regex(pattern) => {
                params.insert("pattern".into(), Value::String(pattern.as_str().to_string()));
            }
            RuleKind::MinLength(min) => {
                params.insert("min".into(), Value::from(*min));
            }
            RuleKind::MaxLength(max) => {
                params.insert("max".into(), Value::from(*max));
            }
            RuleKind::FieldsMatch(other) => {
                params.insert("other".into(), Value::String(other.clone()));
            }
            _ => {}
        }
        params
    }
}

fn texts(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) if !text.is_empty() => vec![text.clone()],
        Value::Number(number) => vec![number.to_string()],
        Value::Array(items) => items.iter().flat_map(texts).collect(),
        _ => Vec::new(),
    }
}

fn length(value: &Value) -> usize {
    match value {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        Value::Number(number) => number.to_string().chars().count(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TextField;
    use crate::spec::field::FieldDefinition;
    use serde_json::json;

    fn field(key: &str, value: Value) -> Field {
        let mut field = Field::new(FieldDefinition::new(key, "text"), Arc::new(TextField), vec![]);
        field.set_value(value);
        field
    }

    #[test]
    fn negation_inverts_is_valid() {
        let fields = vec![field("name", json!("abc"))];
        let ctx = RuleContext::new(&fields);
        for rule in [Rule::not_empty(), Rule::min_length(5), Rule::email()] {
            let negated = rule.clone().negated();
            assert_eq!(rule.validate(&fields[0], &ctx), rule.is_valid(&fields[0], &ctx));
            assert_eq!(negated.validate(&fields[0], &ctx), !negated.is_valid(&fields[0], &ctx));
        }
    }

    #[test]
    fn only_shape_rules_are_skippable_on_empty_values() {
        let fields = vec![field("nickname", json!(""))];
        let ctx = RuleContext::new(&fields);
        let digits = Rule::regex(Regex::new(r"^\d+$").expect("regex"));
        for rule in [digits, Rule::email(), Rule::min_length(2), Rule::max_length(4)] {
            assert!(rule.checks_shape());
            assert!(rule.clone().negated().checks_shape());
        }
        for rule in [Rule::not_empty(), Rule::fields_match("other"), Rule::all(vec![Rule::email()])] {
            assert!(!rule.checks_shape());
        }
        let negated = Rule::email().negated();
        assert_eq!(negated.validate(&fields[0], &ctx), !negated.is_valid(&fields[0], &ctx));
    }

    #[test]
    fn when_skips_children_if_guard_fails() {
        let rule = Rule::when(Rule::not_empty(), vec![Rule::email()]);
        let empty = vec![field("contact", json!(""))];
        assert!(rule.validate(&empty[0], &RuleContext::new(&empty)));
        let bad = vec![field("contact", json!("nope"))];
        assert!(!rule.validate(&bad[0], &RuleContext::new(&bad)));
    }

    #[test]
    fn any_passes_when_one_child_passes() {
        let digits = Regex::new(r"^\d+$").expect("regex");
        let rule = Rule::any(vec![Rule::email(), Rule::regex(digits)]);
        let fields = vec![field("contact", json!("12345"))];
        assert!(rule.validate(&fields[0], &RuleContext::new(&fields)));
    }

    #[test]
    fn conjunction_reports_first_failing_child() {
        let rule = Rule::all(vec![Rule::min_length(2), Rule::email()]);
        let fields = vec![field("contact", json!("abc"))];
        let ctx = RuleContext::new(&fields);
        assert!(!rule.validate(&fields[0], &ctx));
        let failing = rule.failing_rule(&fields[0], &ctx);
        assert_eq!(failing.message(), "{{label}} must be a valid email address");
    }

    #[test]
    fn fields_match_reads_sibling() {
        let fields = vec![field("password", json!("s3cret")), field("confirm", json!("s3cret"))];
        let ctx = RuleContext::new(&fields);
        assert!(Rule::fields_match("password").validate(&fields[1], &ctx));
        let other = vec![field("password", json!("s3cret")), field("confirm", json!("x"))];
        let ctx = RuleContext::new(&other);
        assert!(!Rule::fields_match("password").validate(&other[1], &ctx));
    }

    #[test]
    fn verify_uses_injected_verifier() {
        let verifier: Arc<dyn Verifier> = Arc::new(FnVerifier(|value: &Value, with: Option<&Value>| {
            value == "admin" && with == Some(&json!("hunter2"))
        }));
        let rule = Rule::verify(verifier, Some("password".into()));
        let fields = vec![field("username", json!("admin")), field("password", json!("hunter2"))];
        assert!(rule.validate(&fields[0], &RuleContext::new(&fields)));
    }

    #[test]
    fn unknown_verifier_is_a_schema_error() {
        let spec = RuleSpec::new(RuleKindSpec::Verify {
            verifier: "ldap".into(),
            with: None,
        });
        let err = Rule::from_spec(&spec, "username", &VerifierRegistry::default()).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownVerifier { .. }));
    }
}
