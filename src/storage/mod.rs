//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Values and rows
//! - B+ tree index
//! - Table row store
//! - On-disk layout

pub mod btree;
pub mod disk;
pub mod row;
pub mod table;

pub use btree::BPlusTree;
pub use row::{Row, Value};
pub use table::{IndexProbeOp, RowId, Table};
