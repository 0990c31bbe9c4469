//! Export error taxonomy

use std::fmt;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Errors raised while walking and serializing an export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("record not found: {table}.{column} = {id}")]
    RecordNotFound {
        table: String,
        column: String,
        id: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("dependency chain deeper than {max_depth} at {table} = {id}")]
    DepthExceeded {
        table: String,
        id: String,
        max_depth: usize,
    },

    #[error("export deadline exceeded")]
    DeadlineExceeded,

    #[error("dependency failed in strict mode: {message}")]
    DependencyFailed {
        message: String,
        #[source]
        source: Box<ExportError>,
    },

    #[error("failed to write script: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Fatal errors abort the export even when raised below the root row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExportError::Connection(_)
                | ExportError::Serialization(_)
                | ExportError::DeadlineExceeded
                | ExportError::DependencyFailed { .. }
                | ExportError::Io(_)
        )
    }

    /// Classify a driver error raised by a catalog query.
    ///
    /// Anything the server answered with is a schema problem; anything else
    /// means the transport is gone.
    pub(crate) fn from_pg(err: tokio_postgres::Error, context: impl fmt::Display) -> Self {
        match err.as_db_error() {
            Some(db) => ExportError::Schema(format!("{}: {}", context, db.message())),
            None => ExportError::Connection(format!("{}: {}", context, err)),
        }
    }

    /// True when the server rejected a key value as invalid for the key's type.
    pub(crate) fn is_invalid_key(err: &tokio_postgres::Error) -> bool {
        matches!(
            err.code(),
            Some(code) if *code == SqlState::INVALID_TEXT_REPRESENTATION
                || *code == SqlState::NUMERIC_VALUE_OUT_OF_RANGE
                || *code == SqlState::INVALID_DATETIME_FORMAT
                || *code == SqlState::DATETIME_FIELD_OVERFLOW
        )
    }
}

impl From<deadpool_postgres::PoolError> for ExportError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ExportError::Connection(format!("failed to acquire connection: {}", err))
    }
}
