use thiserror::Error;

use crate::datastore::OwnerId;

/// Raised while turning declarative definitions into runtime forms and wizards.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate field key '{0}'")]
    DuplicateField(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
    #[error("wizard '{0}' has no steps")]
    EmptyWizard(String),
    #[error("step '{step}' references unknown field '{field}'")]
    UnknownStepField { step: String, field: String },
    #[error("step '{step}' jumps to unknown step '{target}'")]
    UnknownStepTarget { step: String, target: String },
    #[error("validator references unknown field '{0}'")]
    UnknownValidatorField(String),
    #[error("field '{field}' has an invalid pattern: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid file type pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("field '{field}' uses unknown verifier '{verifier}'")]
    UnknownVerifier { field: String, verifier: String },
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Business-rule failure raised by a step handler. The wizard turns it into a
/// form-level message and keeps the current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("{0}")]
    Credentials(String),
    #[error("{0}")]
    Upload(String),
    #[error("{0}")]
    Rejected(String),
}

/// Failure reported by a concrete storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Write failure surfaced by a datastore strategy. Earlier writes of the same
/// fan-out are not rolled back.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write '{key}' for owner {owner}: {source}")]
    Backend {
        owner: OwnerId,
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to encode '{key}': {message}")]
    Encode { key: String, message: String },
    #[error("store file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    pub(crate) fn backend(owner: OwnerId, key: &str, source: BackendError) -> Self {
        Self::Backend {
            owner,
            key: key.to_string(),
            source,
        }
    }
}

/// Error returned by wizard step handlers.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
