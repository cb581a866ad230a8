use thiserror::Error;

use crate::scalar::{ScalarType, ScalarValue};

/// Main error type for the Gridmill system
#[derive(Error, Debug)]
pub enum GmError {
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Objective error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Parameter-definition and coercion errors
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("domain value {value} of parameter '{param}' does not match declared type {expected}")]
    DomainTypeMismatch {
        param: String,
        expected: ScalarType,
        value: ScalarValue,
    },

    #[error("cannot coerce {found} ({}) to {expected}", .found.scalar_type())]
    Coercion {
        expected: ScalarType,
        found: ScalarValue,
    },

    #[error("cannot parse '{raw}' as {expected}")]
    Parse { expected: ScalarType, raw: String },

    #[error("'{name}' is not a valid parameter or result name")]
    InvalidName { name: String },

    #[error("unknown parameter: {0}")]
    Unknown(String),
}

/// Task-store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "parameter '{param}' is incompatible with the recorded manifest: \
         recorded (type: {recorded_type}, default: {recorded_default}), \
         declared (type: {declared_type}, default: {declared_default}); \
         remove the manifest if the change is intentional"
    )]
    SchemaIncompatible {
        param: String,
        recorded_type: String,
        recorded_default: String,
        declared_type: String,
        declared_default: String,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("column '{column}' holds {found}, which does not decode as the declared type")]
    Decode { column: String, found: String },
}

/// Failures of the caller-supplied objective function. The owning row is
/// rolled back to PENDING before one of these is surfaced.
#[derive(Error, Debug)]
pub enum ObjectiveError {
    #[error("objective function failed: {0}")]
    Failed(#[from] anyhow::Error),

    #[error("objective function returned no result")]
    NoResult,
}

impl From<rusqlite::Error> for GmError {
    fn from(err: rusqlite::Error) -> Self {
        GmError::Store(StoreError::Sqlite(err))
    }
}

pub type GmResult<T> = Result<T, GmError>;
