pub mod field;
pub mod flow;
pub mod form;
pub mod rule;

pub use field::{CompositePartSpec, CompositePreset, FieldDefinition, StorageSpec};
pub use flow::{DecisionCase, StepSpec, WizardSpec};
pub use form::{FormSchema, ValidatorSpec};
pub use rule::{RuleKindSpec, RuleSpec};
