//! Error types for template and clone database management.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout pgclone.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while provisioning or tearing down test databases.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (schema source, naming parameters).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server could not be reached or refused the credentials.
    #[error("Cannot connect to database {database}: {source}")]
    Connection {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// An administrative statement failed (existence check, CREATE, DROP).
    #[error("{operation} failed for database {database}: {source}")]
    Ddl {
        operation: DdlOperation,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// The schema script failed against a freshly created template.
    #[error("Schema script failed against template {database}: {source}")]
    SchemaApply {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// A fixture statement failed while seeding a clone.
    #[error("can't load fixture at idx {index}: {source}")]
    Fixture {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    /// Connections were still checked out when teardown ran.
    #[error("unreleased connections exists: {acquired}, can't drop database {database}")]
    Leak { acquired: u32, database: String },

    /// A network operation ran past its deadline.
    #[error("{operation} on database {database} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        database: String,
        timeout: Duration,
    },

    /// The pool has no connection target or was told to skip.
    #[error("Test databases are disabled: {0}")]
    Disabled(String),

    /// Template creation failed earlier in this process; the cached error is replayed.
    #[error(transparent)]
    Template(Arc<Error>),
}

/// Administrative statement kinds, used as error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOperation {
    ExistenceCheck,
    CreateDatabase,
    DropDatabase,
    ListDatabases,
}

impl std::fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DdlOperation::ExistenceCheck => "Existence check",
            DdlOperation::CreateDatabase => "CREATE DATABASE",
            DdlOperation::DropDatabase => "DROP DATABASE",
            DdlOperation::ListDatabases => "Database listing",
        };
        f.write_str(name)
    }
}

/// Flat classification of [`Error`], seeing through replayed template failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Ddl,
    SchemaApply,
    Fixture,
    Leak,
    Timeout,
    Disabled,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn ddl(operation: DdlOperation, database: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Ddl {
            operation,
            database: database.into(),
            source,
        }
    }

    pub(crate) fn connection(database: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            database: database.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Ddl { .. } => ErrorKind::Ddl,
            Error::SchemaApply { .. } => ErrorKind::SchemaApply,
            Error::Fixture { .. } => ErrorKind::Fixture,
            Error::Leak { .. } => ErrorKind::Leak,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Disabled(_) => ErrorKind::Disabled,
            Error::Template(inner) => inner.kind(),
        }
    }

    /// True when the pool is disabled and the calling test should return early.
    pub fn is_disabled(&self) -> bool {
        self.kind() == ErrorKind::Disabled
    }

    /// Index of the failing fixture, if this is a fixture error.
    pub fn fixture_index(&self) -> Option<usize> {
        match self {
            Error::Fixture { index, .. } => Some(*index),
            _ => None,
        }
    }
}
