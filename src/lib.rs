//! # Rowmap - convention-driven entity mapping
//!
//! Maps typed entities onto SQLite rows without a schema-generation step.
//! Every storage name is derived from a small registry of entity declarations:
//! - table `<type>` (lowercased), primary key `<table>_id`
//! - scalar columns `<table>_<column>`
//! - parent foreign keys `<relation>_id`
//! - junction tables `<a>__<b>` (sorted) for many-to-many siblings
//!
//! Rowmap provides:
//! - A static schema registry resolved once at startup
//! - Parameterized SQL templates for load, list, insert, update and delete
//! - Lazily loaded entity instances with eager bulk hydration
//! - Parent, child and sibling traversal plus sibling linking

pub mod value;
pub mod schema;
pub mod query;
pub mod storage;
pub mod entity;
pub mod relation;
pub mod config;
pub mod ui;

#[cfg(test)]
mod fixtures;

// Re-exports for convenient access
pub use value::Value;
pub use schema::{EntityDef, EntityDescriptor, EntityType, Junction, Schema};
pub use query::Statement;
pub use storage::{Record, Session};
pub use entity::{Assign, Attribute, Entity};
pub use config::RowmapConfig;

/// Primary key type shared by every entity table
pub type RowId = i64;

/// Result type alias for Rowmap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// The database could not be opened, reached, or locked
    Connectivity,
    /// A unique, foreign key, not-null or check constraint rejected the write
    Constraint,
    /// Any other statement failure (syntax, missing table, type mismatch)
    Query,
}

impl std::fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DatabaseErrorKind::Connectivity => "connectivity",
            DatabaseErrorKind::Constraint => "constraint",
            DatabaseErrorKind::Query => "query",
        };
        write!(f, "{}", s)
    }
}

/// Error types for Rowmap operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Database error ({kind}): {message}")]
    Database {
        kind: DatabaseErrorKind,
        message: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{entity} has no attribute '{name}'")]
    UnrecognizedAttribute { entity: String, name: String },

    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: RowId },

    #[error("{entity} has unsaved modifications")]
    LockedForModification { entity: String },

    #[error("{entity} has not been saved yet")]
    NotPersisted { entity: String },

    #[error("Cannot assign '{name}' on {entity}: {reason}")]
    InvalidAssignment {
        entity: String,
        name: String,
        reason: String,
    },

    #[error("Invalid {entity} row: {reason}")]
    InvalidRow { entity: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Wrap a driver error, classifying it by SQLite result code
    pub(crate) fn database(source: rusqlite::Error) -> Self {
        Error::Database {
            kind: storage::classify(&source),
            message: source.to_string(),
            source,
        }
    }

    /// The database error kind, if this is a statement failure
    pub fn database_kind(&self) -> Option<DatabaseErrorKind> {
        match self {
            Error::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
