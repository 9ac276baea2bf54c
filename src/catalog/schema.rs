//! Schema definitions for QuarryDB
//!
//! This module defines table definitions, column metadata and foreign keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::DataType;
use crate::error::{Error, Result};

/// Check that `name` is usable as a table, column or schema name.
///
/// Table and schema names become directory names and column names become
/// row keys, so only letters, digits and `_` are accepted. This excludes
/// empty names, path separators, `.` and `..`.
pub fn validate_identifier(kind: &'static str, name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(Error::InvalidIdentifier {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Table definition - full table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name
    pub name: String,
    /// Ordered list of columns
    pub columns: Vec<Column>,
    /// Primary key column name
    pub primary_key: String,
}

impl TableDef {
    /// Create a table definition, checking that the primary key is a
    /// declared column and that column names are unique
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let primary_key = primary_key.into();

        validate_identifier("table", &name)?;
        for col in &columns {
            validate_identifier("column", &col.name)?;
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::ColumnAlreadyExists(col.name.clone(), name));
            }
        }
        if !columns.iter().any(|c| c.name == primary_key) {
            return Err(Error::ColumnNotFound(primary_key, name));
        }

        Ok(Self {
            name,
            columns,
            primary_key,
        })
    }

    /// Get the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column position by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Get column names in declared order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the primary key column
    pub fn primary_key_column(&self) -> &Column {
        // TableDef::new guarantees the primary key is declared
        self.get_column(&self.primary_key)
            .unwrap_or(&self.columns[0])
    }
}

/// Referential policy of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FkPolicy {
    /// Block the operation while dependents exist
    #[default]
    Restrict,
    /// Propagate the operation to dependents
    Cascade,
}

impl FkPolicy {
    pub fn is_cascade(&self) -> bool {
        matches!(self, FkPolicy::Cascade)
    }
}

impl FromStr for FkPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "RESTRICT" => Ok(FkPolicy::Restrict),
            "CASCADE" => Ok(FkPolicy::Cascade),
            other => Err(Error::Corrupted(format!(
                "unknown foreign key policy '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for FkPolicy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FkPolicy> for String {
    fn from(policy: FkPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for FkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FkPolicy::Restrict => write!(f, "RESTRICT"),
            FkPolicy::Cascade => write!(f, "CASCADE"),
        }
    }
}

/// Single-column foreign key; always targets the referenced table's
/// primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub local_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(default)]
    pub policy: FkPolicy,
}

impl ForeignKey {
    pub fn new(
        local_column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
        policy: FkPolicy,
    ) -> Self {
        Self {
            local_column: local_column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
            policy,
        }
    }
}

/// Reverse-map entry: `referencing_table` declares `foreign_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub referencing_table: String,
    #[serde(flatten)]
    pub foreign_key: ForeignKey,
}
