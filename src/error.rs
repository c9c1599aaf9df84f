//! Error types for envstack.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Malformed schema declarations. Fatal: a process cannot start with one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Field name cannot be empty in schema '{schema}'")]
    EmptyName { schema: String },

    #[error("Duplicate field '{field}' in schema '{schema}'")]
    DuplicateField { schema: String, field: String },

    #[error("Field '{field}' declares numeric bounds but has non-numeric type {ty}")]
    BoundsOnNonNumeric { field: String, ty: String },

    #[error("Field '{field}' has min_val {min} greater than max_val {max}")]
    InvertedBounds { field: String, min: f64, max: f64 },

    #[error("Choice '{choice}' for field '{field}' does not match declared type {ty}")]
    ChoiceTypeMismatch {
        field: String,
        choice: String,
        ty: String,
    },

    #[error("Default '{value}' for field '{field}' does not match declared type {ty}")]
    DefaultTypeMismatch {
        field: String,
        value: String,
        ty: String,
    },

    #[error("Nested field '{field}' cannot declare {what}")]
    NestedConstraint { field: String, what: &'static str },

    #[error("Unsupported type '{ty}' for field '{field}'")]
    UnsupportedType { field: String, ty: String },

    #[error("Failed to read schema file '{path}': {message}")]
    ReadFailed { path: PathBuf, message: String },

    #[error("Failed to parse schema file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },
}

/// Failures reading or parsing a raw source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read source '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse source '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Invalid source pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// A raw value that could not be converted to its declared type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot cast '{raw}' to {expected}: {reason}")]
pub struct CastError {
    pub raw: String,
    pub expected: String,
    pub reason: String,
}

impl CastError {
    pub(crate) fn new(
        raw: impl Into<String>,
        expected: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            expected: expected.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which numeric bound a value fell outside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Min => f.write_str("< min_val"),
            Bound::Max => f.write_str("> max_val"),
        }
    }
}

/// A single problem found while building one field.
///
/// Values of secret fields are masked before they reach any of these variants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Missing required variable: {key}")]
    MissingRequired { key: String },

    #[error("Error casting {key}: {source}")]
    Cast { key: String, source: CastError },

    #[error("{key} ({value}) {bound} {limit}")]
    Range {
        key: String,
        value: String,
        bound: Bound,
        limit: f64,
    },

    #[error("{key} ({value}) is not in allowed choices [{choices}]")]
    Choice {
        key: String,
        value: String,
        choices: String,
    },

    #[error("Custom validation failed for {key} ({value})")]
    Custom { key: String, value: String },

    #[error("Post-build check failed for {scope}: {message}")]
    Hook { scope: String, message: String },
}

impl FieldError {
    /// Fully-qualified key (or schema scope for hooks) this error is about.
    pub fn key(&self) -> &str {
        match self {
            FieldError::MissingRequired { key }
            | FieldError::Cast { key, .. }
            | FieldError::Range { key, .. }
            | FieldError::Choice { key, .. }
            | FieldError::Custom { key, .. } => key,
            FieldError::Hook { scope, .. } => scope,
        }
    }

    /// Returns true for a required field that resolved to nothing.
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldError::MissingRequired { .. })
    }
}

/// Every error found during one build attempt, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBuildError {
    errors: Vec<FieldError>,
}

impl AggregateBuildError {
    pub(crate) fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Returns the collected errors.
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns the number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Keys of all required fields that could not be resolved.
    pub fn missing_keys(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.is_missing())
            .map(FieldError::key)
            .collect()
    }
}

impl fmt::Display for AggregateBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateBuildError {}

impl IntoIterator for AggregateBuildError {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Failure of a one-shot build from sources.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration invalid: {0}")]
    Invalid(#[from] AggregateBuildError),
}

/// Why a background reload was discarded.
#[derive(Error, Debug)]
pub enum ReloadFailure {
    #[error(transparent)]
    Build(#[from] AggregateBuildError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Reload callback failed: {message}")]
    Callback { message: String },
}

impl From<BuildError> for ReloadFailure {
    fn from(error: BuildError) -> Self {
        match error {
            BuildError::Source(e) => ReloadFailure::Source(e),
            BuildError::Invalid(e) => ReloadFailure::Build(e),
        }
    }
}

/// A non-fatal failure observed by the reload watcher.
#[derive(Error, Debug)]
#[error("Reload at {at} failed: {cause}")]
pub struct WatcherReloadError {
    pub at: DateTime<Utc>,
    #[source]
    pub cause: ReloadFailure,
}

impl WatcherReloadError {
    pub(crate) fn now(cause: impl Into<ReloadFailure>) -> Self {
        Self {
            at: Utc::now(),
            cause: cause.into(),
        }
    }
}

/// Typed access to a built instance failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("No such field: {name}")]
    NoSuchField { name: String },

    #[error("Field '{name}' holds {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: &'static str,
    },

    #[error("Field '{name}' is not a nested section")]
    NotASection { name: String },
}
