//! Error types for QuarryDB
//!
//! This module defines all error types used throughout the database engine.

use thiserror::Error;

/// The main error type for QuarryDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Catalog error: column '{0}' already exists in table '{1}'")]
    ColumnAlreadyExists(String, String),

    #[error("Catalog error: invalid {kind} name '{name}' (letters, digits and '_' only)")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("Catalog error: unsupported column type '{0}' (only INT and TEXT are allowed)")]
    UnsupportedType(String),

    #[error("Catalog error: table '{table}' must declare exactly one primary key column, found {found}")]
    PrimaryKeyMissing { table: String, found: usize },

    #[error("Catalog error: only single-column foreign keys are supported ({0})")]
    MultiColumnForeignKeyUnsupported(String),

    #[error("Catalog error: invalid foreign key target {table}.{column}: {reason}")]
    InvalidForeignKeyTarget {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Catalog error: cannot modify '{table}': still referenced by {referenced_by:?}")]
    ReferentialRestriction {
        table: String,
        referenced_by: Vec<String>,
    },

    // ========== Storage Errors ==========
    #[error("Type error: column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Storage error: duplicate key {key} in '{relation}'")]
    DuplicateKey { relation: String, key: String },

    #[error("Storage error: row columns {found:?} do not match columns {expected:?} of table '{table}'")]
    ColumnMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Storage error: corrupted data - {0}")]
    Corrupted(String),

    // ========== Execution Errors ==========
    #[error("Execution error: foreign key violation - {0}")]
    ForeignKeyViolation(String),

    #[error("Execution error: unsupported aggregate function '{0}'")]
    UnsupportedAggregate(String),

    #[error("Execution error: unsupported predicate - {0}")]
    UnsupportedPredicate(String),

    #[error("Execution error: unsupported expression - {0}")]
    UnsupportedExpression(String),

    #[error("Execution error: invalid LIMIT value {0}")]
    InvalidLimit(String),

    #[error("Execution error: {0}")]
    InvalidQuery(String),

    // ========== Parse Errors ==========
    #[error("Parse error: {0}")]
    ParseDelegation(#[source] Box<dyn std::error::Error + Send + Sync>),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for QuarryDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Catalog error: table 'users' not found");

        let err = Error::ReferentialRestriction {
            table: "students".to_string(),
            referenced_by: vec!["enrollments".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Catalog error: cannot modify 'students': still referenced by [\"enrollments\"]"
        );
    }

    #[test]
    fn test_parse_delegation_keeps_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::InvalidInput, "near 'SELEC'");
        let err = Error::ParseDelegation(Box::new(inner));
        assert_eq!(err.to_string(), "Parse error: near 'SELEC'");
        assert!(std::error::Error::source(&err).is_some());
    }
}
