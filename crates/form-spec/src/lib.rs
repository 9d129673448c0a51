#![allow(missing_docs)]

pub mod changeset;
pub mod datastore;
pub mod env;
pub mod error;
pub mod expr;
pub mod field;
pub mod filters;
pub mod flow;
pub mod form;
pub mod payload_schema;
pub mod render;
pub mod rule;
pub mod spec;
pub mod template;
pub mod validate;
pub mod wizard;

pub use changeset::Changeset;
pub use datastore::{
    AssociationStrategy, Backends, BlobStrategy, CompositePart, CompositeStrategy, Datastore,
    FileStore, KeyValueStore, MembershipStore, MemoryStore, OwnerId, Persistence, RowStrategy,
    StoreSnapshot,
};
pub use env::FormEnvironment;
pub use error::{BackendError, PersistenceError, ProcessingError, SchemaError, StepError};
pub use expr::Expr;
pub use field::{Field, FieldType, TypeRegistry, UploadedFile, Weekday};
pub use filters::{FORM_FIELDS, FORM_VALUES, Filters};
pub use flow::{FlowState, build_wizard, load_stored};
pub use form::{Form, REQUIRED_MESSAGE};
pub use payload_schema::generate as payload_schema;
pub use render::{RenderPayload, RenderStatus, build_render_payload, render_json_ui, render_text};
pub use rule::{FnVerifier, Rule, RuleContext, RuleKind, Verifier, VerifierRegistry};
pub use spec::{
    CompositePartSpec, CompositePreset, DecisionCase, FieldDefinition, FormSchema, RuleKindSpec,
    RuleSpec, StepSpec, StorageSpec, ValidatorSpec, WizardSpec,
};
pub use template::{MessageRenderer, register_default_helpers};
pub use validate::{
    AllowedFileTypes, FnValidator, FormValidator, RequiredTerms, StaticTerms, TermCatalog,
    ValidationError, ValidationResult, validate,
};
pub use wizard::{
    ProcessOutcome, STEP_FIELD, StepContext, StepRef, Transition, ViewContext, Wizard, WizardStep,
};
