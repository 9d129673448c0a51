use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declarative validation rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuleSpec {
    #[serde(flatten)]
    pub kind: RuleKindSpec,
    /// Handlebars template; `key`, `label`, `value` and the rule parameters are in scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
}

impl RuleSpec {
    pub fn new(kind: RuleKindSpec) -> Self {
        Self {
            kind,
            message: None,
            negate: false,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }
}

impl From<RuleKindSpec> for RuleSpec {
    fn from(kind: RuleKindSpec) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleKindSpec {
    NotEmpty,
    Email,
    Regex {
        pattern: String,
    },
    MinLength {
        min: usize,
    },
    MaxLength {
        max: usize,
    },
    FieldsMatch {
        other: String,
    },
    /// Valid when every child is valid.
    All {
        rules: Vec<RuleSpec>,
    },
    /// Valid when at least one child is valid.
    Any {
        rules: Vec<RuleSpec>,
    },
    /// Children only apply while `guard` holds for the current value.
    When {
        guard: Box<RuleSpec>,
        then: Vec<RuleSpec>,
    },
    /// Delegates to a verifier registered on the form environment.
    Verify {
        verifier: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        with: Option<String>,
    },
}
