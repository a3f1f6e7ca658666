use crate::repo::RepositoryError;
use thiserror::Error as ThisError;

///
/// IntegrityError
///
/// Structural mismatch between a template and the data walked against it.
/// Unrecoverable at the point raised; propagates to the original
/// serialize/deserialize/resolve invocation without partial-result recovery.
///

#[derive(Debug, ThisError)]
pub enum IntegrityError {
    #[error("required field '{field}' missing")]
    RequiredFieldMissing { field: String },

    #[error("required conditions field '{field}' missing")]
    RequiredConditionsFieldMissing { field: String },

    #[error("no conditions matched for field '{field}', and no default case provided")]
    NoConditionsMatched { field: String },

    #[error("required inherited field '{field}' wasn't supplied")]
    MissingInheritedField { field: String },

    #[error("no increment counter was supplied for field '{field}'")]
    MissingIncrementCounter { field: String },

    #[error("entity '{entity}' carries an id rule but the data has no '_id' marker")]
    MissingIdMarker { entity: String },

    #[error("template has no id rule")]
    MissingIdRule,

    #[error("invalid template rule at '{path}'")]
    InvalidRule { path: String },

    #[error("null reference at '{path}' on a non-nullable rule")]
    NullReference { path: String },

    #[error("expected a reference object at '{path}'")]
    MalformedReference { path: String },

    #[error("value at '{path}' is not usable as an entity key")]
    InvalidKey { path: String },

    #[error("expected {expected} at '{path}'")]
    StructureMismatch {
        path: String,
        expected: &'static str,
    },

    #[error("created record is missing its primary key field '{field}'")]
    MissingPrimaryKey { field: String },

    #[error("internal id '{id}' is already bound")]
    AlreadyBound { id: String },

    #[error("internal id '{id}' couldn't be resolved")]
    Unresolved { id: String },

    #[error("the updating deserializer requires a primary key set before use")]
    UpdateKeyNotSet,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

///
/// CompositionError
///
/// Template-registry-level failures raised by the hierarchical composer.
/// Integrity failures encountered mid-walk are wrapped so a hierarchical
/// call surfaces a single error type.
///

#[derive(Debug, ThisError)]
pub enum CompositionError {
    #[error("template has no id rule")]
    MissingIdRule,

    #[error("a template is already registered for entity '{entity}'")]
    DuplicateRegistration { entity: String },

    #[error("entity '{entity}' wasn't found in the registry")]
    UnknownEntity { entity: String },

    #[error("related entity '{entity}' data didn't exist at field '{field}'")]
    MissingRelationData { entity: String, field: String },

    #[error("has-many field '{field}' must hold a list of objects")]
    RelationNotAList { field: String },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

///
/// FormatError
///
/// Failure surface for wire-format adapters (external collaborators).
///

#[derive(Debug, ThisError)]
pub enum FormatError {
    #[error("malformed wire payload: {message}")]
    Malformed { message: String },
}
