//! QuarryDB - A small single-node relational database engine written in Rust
//!
//! This library provides the core components behind a SQL front end:
//! - System catalog with foreign-key bookkeeping
//! - Row store with B+ tree indexes and CSV/JSON persistence
//! - Query execution over a typed statement tree
//! - A heuristic optimizer for joins and predicates
//!
//! SQL text is parsed elsewhere; any parser producing [`sql::Statement`]
//! values can be plugged in through [`sql::SqlParser`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;

pub use config::DatabaseConfig;
pub use error::{Error, Result};
pub use executor::{ExecutionEngine, QueryResult, SharedEngine};
