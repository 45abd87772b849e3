//! Error types for the AIRR library

use thiserror::Error;

use crate::schema::TypeTag;

/// Result type for AIRR operations
pub type Result<T> = std::result::Result<T, AirrError>;

/// AIRR library errors
#[derive(Error, Debug)]
pub enum AirrError {
    #[error("Schema definition {name} cannot be found in the schema")]
    SchemaNotFound { name: String },

    #[error("Invalid schema definition {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("File is missing AIRR required fields: {}", .fields.join(", "))]
    MissingRequiredFields { fields: Vec<String> },

    #[error("Row {row} has {found} fields but the header has {expected}")]
    RowShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid {expected} value {raw:?} for field {field}{}", .row.map(|r| format!(" in row {r}")).unwrap_or_default())]
    InvalidValue {
        field: String,
        raw: String,
        expected: TypeTag,
        row: Option<usize>,
    },

    #[error("Duplicate {field} value {value:?} in row {row}")]
    DuplicateIdentifier {
        field: String,
        value: String,
        row: usize,
    },

    #[error("Value for field {field} contains a tab or newline and cannot be written")]
    DelimiterInValue { field: String },

    #[error("Stream has already been closed")]
    StreamClosed,

    #[error("Unknown file type: {0}. Supported file extensions are \"yaml\", \"yml\" or \"json\"")]
    UnknownFormat(String),

    #[error("{key} object cannot be found in the file")]
    MissingObject { key: String },

    #[error("{failures} object(s) failed validation; first: {first}")]
    InvalidDocument { failures: usize, first: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

/// A structural violation found while walking a hierarchical object.
///
/// Every variant carries the dotted path of the offending field, for example
/// `Repertoire.0.sample.0.pcr_target.0.pcr_target_locus`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("AIRR required field ({path}) is missing")]
    RequiredFieldMissing { path: String },

    #[error("Field ({path}) is missing")]
    OptionalFieldMissing { path: String },

    #[error("Non-nullable field ({path}) is null")]
    NonNullableFieldNull { path: String },

    #[error("Field ({path}) is not {expected}: {actual}")]
    TypeMismatch {
        path: String,
        expected: TypeTag,
        actual: String,
    },

    #[error("Field ({path}) value {value} is not one of {}", render_allowed(.allowed))]
    EnumViolation {
        path: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Field ({path}) references unresolvable definition {target}")]
    UnresolvedReference { path: String, target: String },

    #[error("Definition for ({path}) is unusable: {reason}")]
    InvalidDefinition { path: String, reason: String },
}

impl ValidationError {
    /// Dotted location of the offending field
    pub fn path(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { path }
            | ValidationError::OptionalFieldMissing { path }
            | ValidationError::NonNullableFieldNull { path }
            | ValidationError::TypeMismatch { path, .. }
            | ValidationError::EnumViolation { path, .. }
            | ValidationError::UnresolvedReference { path, .. }
            | ValidationError::InvalidDefinition { path, .. } => path,
        }
    }
}

fn render_allowed(allowed: &[String]) -> String {
    format!("[{}]", allowed.join(", "))
}
