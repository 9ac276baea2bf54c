//! Catalog module
//!
//! This module contains the schema catalog, table definitions, foreign keys
//! and data types.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::Catalog;
pub use schema::{validate_identifier, Column, FkPolicy, ForeignKey, ForeignKeyRef, TableDef};
pub use types::DataType;
