//! Data types for QuarryDB
//!
//! This module defines the SQL data types supported by the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// SQL Data Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit integer
    #[serde(rename = "INT")]
    Int,
    /// Unlimited text
    #[serde(rename = "TEXT")]
    Text,
}

impl DataType {
    /// Resolve a declared SQL type name
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "INT" | "INTEGER" => Some(DataType::Int),
            "TEXT" => Some(DataType::Text),
            _ => None,
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::from_sql_name(s).ok_or_else(|| Error::UnsupportedType(s.to_string()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}
