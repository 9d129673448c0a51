use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::spec::form::FormSchema;

/// A declarative multi-step wizard over a single form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WizardSpec {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub form: FormSchema,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepSpec {
    /// Shows `fields`, binds and validates them on submit, then advances.
    Fields {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        fields: Vec<String>,
    },
    /// View-less branching step; jumps to the first case whose condition holds.
    Decision {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
        cases: Vec<DecisionCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// View-less step persisting pending changes for the request owner.
    Save {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
    },
    /// Terminal display step.
    Message {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
    },
}

impl StepSpec {
    pub fn name(&self) -> &str {
        match self {
            StepSpec::Fields { name, .. }
            | StepSpec::Decision { name, .. }
            | StepSpec::Save { name, .. }
            | StepSpec::Message { name, .. } => name,
        }
    }

    pub fn priority(&self) -> Option<i32> {
        match self {
            StepSpec::Fields { priority, .. }
            | StepSpec::Decision { priority, .. }
            | StepSpec::Save { priority, .. }
            | StepSpec::Message { priority, .. } => *priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionCase {
    pub when: Expr,
    pub goto: String,
}
