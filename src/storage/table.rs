//! Table storage for QuarryDB
//!
//! This module combines a table definition with its rows and ordered
//! indexes. Rows live in an append-oriented vector; a row's position is its
//! row id, which is what every index stores. Bulk deletion compacts the
//! vector and rebuilds all indexes, so row ids are only stable between
//! mutations.

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Bound;

use super::btree::BPlusTree;
use super::row::{Row, Value};
use crate::catalog::TableDef;
use crate::error::{Error, Result};

/// Positional identifier of a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub usize);

/// Comparison used to probe an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexProbeOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A table combining its definition, rows and indexes
#[derive(Debug, Clone)]
pub struct Table {
    /// Table definition (metadata)
    def: TableDef,
    /// Row storage, indexed by row id
    rows: Vec<Row>,
    /// Indexes: column name -> B+ tree. The primary key always has one.
    indexes: IndexMap<String, BPlusTree>,
}

impl Table {
    /// Create a new empty table with its primary-key index
    pub fn new(def: TableDef) -> Self {
        let mut indexes = IndexMap::new();
        indexes.insert(
            def.primary_key.clone(),
            BPlusTree::new_unique(format!("{}.{}", def.name, def.primary_key)),
        );
        Self {
            def,
            rows: Vec::new(),
            indexes,
        }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Get table definition
    pub fn definition(&self) -> &TableDef {
        &self.def
    }

    /// Get the primary key column name
    pub fn primary_key(&self) -> &str {
        &self.def.primary_key
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check that a row has exactly this table's columns with values of
    /// the declared types
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        let expected: HashSet<&str> = self.def.columns.iter().map(|c| c.name.as_str()).collect();
        let found: HashSet<&str> = row.keys().collect();
        if expected != found || row.len() != self.def.columns.len() {
            return Err(Error::ColumnMismatch {
                table: self.name().to_string(),
                expected: self.def.columns.iter().map(|c| c.name.clone()).collect(),
                found: row.keys().map(str::to_string).collect(),
            });
        }

        for col in &self.def.columns {
            if let Some(value) = row.get(&col.name) {
                if !value.matches_type(&col.data_type) {
                    return Err(Error::TypeMismatch {
                        column: col.name.clone(),
                        expected: col.data_type.to_string(),
                        found: value.type_name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Lay a row out in declared column order
    fn normalize(&self, row: &Row) -> Row {
        self.def
            .columns
            .iter()
            .filter_map(|c| row.get(&c.name).map(|v| (c.name.clone(), v.clone())))
            .collect()
    }

    fn primary_key_of<'a>(&self, row: &'a Row) -> Option<&'a Value> {
        row.get(&self.def.primary_key)
    }

    /// Insert a row into the table
    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        self.validate_row(&row)?;

        if let Some(key) = self.primary_key_of(&row) {
            if self.select_by_key(key).is_some() {
                return Err(Error::DuplicateKey {
                    relation: self.name().to_string(),
                    key: key.to_string(),
                });
            }
        }

        let row = self.normalize(&row);
        let row_id = RowId(self.rows.len());

        // The primary key was checked above, so this only fails on a
        // corrupted index, in which case the indexes are rebuilt from rows
        let mut failure = None;
        for (column, tree) in self.indexes.iter_mut() {
            if let Some(value) = row.get(column) {
                if let Err(e) = tree.insert(value.clone(), row_id) {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            self.rebuild_indexes();
            return Err(e);
        }
        self.rows.push(row);

        Ok(row_id)
    }

    /// Get a row by row id
    pub fn get(&self, row_id: RowId) -> Option<&Row> {
        self.rows.get(row_id.0)
    }

    /// All live rows, in insertion order
    pub fn select_all(&self) -> Vec<&Row> {
        self.rows.iter().collect()
    }

    /// All live rows with their row ids
    pub fn scan(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().enumerate().map(|(i, r)| (RowId(i), r))
    }

    /// Point lookup through the primary-key index
    pub fn select_by_key(&self, key: &Value) -> Option<&Row> {
        let tree = self.indexes.get(&self.def.primary_key)?;
        tree.search(key).first().and_then(|id| self.get(*id))
    }

    /// Rows whose primary key lies in `[low, high)`, in key order
    pub fn range_query(&self, low: &Value, high: &Value) -> Vec<&Row> {
        let Some(tree) = self.indexes.get(&self.def.primary_key) else {
            return Vec::new();
        };
        tree.range(Bound::Included(low), Bound::Excluded(high))
            .into_iter()
            .filter_map(|(_, id)| self.get(id))
            .collect()
    }

    /// Build an index on a column, or rebuild it if one already exists
    pub fn create_index(&mut self, column: &str) -> Result<()> {
        if !self.def.has_column(column) {
            return Err(Error::ColumnNotFound(
                column.to_string(),
                self.name().to_string(),
            ));
        }

        if self.indexes.contains_key(column) {
            tracing::info!(table = %self.name(), column, "rebuilding existing index");
        } else {
            tracing::info!(table = %self.name(), column, "creating index");
        }

        let tree = self.build_index(column);
        // Swap in the fully built tree
        self.indexes.insert(column.to_string(), tree);
        Ok(())
    }

    /// Build a fresh tree for `column` from current row contents.
    ///
    /// Pairs are inserted in randomized order so that already-sorted data
    /// does not always split the same edge of the tree. A pair the tree
    /// rejects (a duplicate in a unique index) is logged and skipped.
    fn build_index(&self, column: &str) -> BPlusTree {
        let name = format!("{}.{}", self.name(), column);
        let mut tree = if column == self.def.primary_key {
            BPlusTree::new_unique(name)
        } else {
            BPlusTree::new(name)
        };

        let mut pairs: Vec<(Value, RowId)> = self
            .scan()
            .filter_map(|(id, row)| row.get(column).map(|v| (v.clone(), id)))
            .collect();
        pairs.shuffle(&mut rand::thread_rng());

        for (value, row_id) in pairs {
            if let Err(e) = tree.insert(value, row_id) {
                tracing::warn!(index = %tree.name, error = %e, "skipping key during index rebuild");
            }
        }
        tree
    }

    /// Rebuild every index from row contents
    pub fn rebuild_indexes(&mut self) {
        let columns: Vec<String> = self.indexes.keys().cloned().collect();
        for column in columns {
            let tree = self.build_index(&column);
            self.indexes.insert(column, tree);
        }
    }

    /// Get index for a column
    pub fn get_index(&self, column: &str) -> Option<&BPlusTree> {
        self.indexes.get(column)
    }

    pub fn has_index(&self, column: &str) -> bool {
        self.indexes.contains_key(column)
    }

    /// Columns carrying an index, primary key first
    pub fn indexed_columns(&self) -> Vec<&str> {
        self.indexes.keys().map(|k| k.as_str()).collect()
    }

    /// Probe the index on `column`. Returns `None` when the column has no
    /// index; otherwise the matching row ids in key order.
    pub fn index_lookup(&self, column: &str, op: IndexProbeOp, value: &Value) -> Option<Vec<RowId>> {
        let tree = self.indexes.get(column)?;
        let ids = match op {
            IndexProbeOp::Eq => tree.search(value).to_vec(),
            IndexProbeOp::Gt => ids_of(tree.range(Bound::Excluded(value), Bound::Unbounded)),
            IndexProbeOp::Gte => ids_of(tree.range(Bound::Included(value), Bound::Unbounded)),
            IndexProbeOp::Lt => ids_of(tree.range(Bound::Unbounded, Bound::Excluded(value))),
            IndexProbeOp::Lte => ids_of(tree.range(Bound::Unbounded, Bound::Included(value))),
        };
        Some(ids)
    }

    /// Row ids whose `column` equals `value`, through an index when one
    /// exists, otherwise by scanning
    pub fn find_rows(&self, column: &str, value: &Value) -> Vec<RowId> {
        if let Some(ids) = self.index_lookup(column, IndexProbeOp::Eq, value) {
            return ids;
        }
        self.scan()
            .filter(|(_, row)| row.get(column) == Some(value))
            .map(|(id, _)| id)
            .collect()
    }

    /// Replace the row at `row_id`, keeping indexes in sync
    pub fn update(&mut self, row_id: RowId, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        let row = self.normalize(&row);

        let old_row = self
            .get(row_id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("row {:?} not found", row_id)))?;

        if let (Some(old_key), Some(new_key)) =
            (self.primary_key_of(&old_row), self.primary_key_of(&row))
        {
            if old_key != new_key && self.select_by_key(new_key).is_some() {
                return Err(Error::DuplicateKey {
                    relation: self.name().to_string(),
                    key: new_key.to_string(),
                });
            }
        }

        for (column, tree) in self.indexes.iter_mut() {
            let (Some(old_value), Some(new_value)) = (old_row.get(column), row.get(column)) else {
                continue;
            };
            if old_value != new_value {
                tree.remove(old_value, row_id);
                tree.insert(new_value.clone(), row_id)?;
            }
        }
        self.rows[row_id.0] = row;

        Ok(())
    }

    /// Replace several rows at once, then rebuild indexes. Primary keys
    /// are checked over the resulting row set, so keys may be exchanged
    /// between the replaced rows. Nothing changes if any check fails.
    pub fn replace_rows(&mut self, updates: Vec<(RowId, Row)>) -> Result<()> {
        let mut replaced: IndexMap<RowId, Row> = IndexMap::with_capacity(updates.len());
        for (row_id, row) in updates {
            if self.get(row_id).is_none() {
                return Err(Error::Internal(format!("row {:?} not found", row_id)));
            }
            self.validate_row(&row)?;
            replaced.insert(row_id, self.normalize(&row));
        }

        let mut keys = HashSet::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let row = replaced.get(&RowId(position)).unwrap_or(row);
            if let Some(key) = self.primary_key_of(row) {
                if !keys.insert(key) {
                    return Err(Error::DuplicateKey {
                        relation: self.name().to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }

        for (row_id, row) in replaced {
            self.rows[row_id.0] = row;
        }
        self.rebuild_indexes();
        Ok(())
    }

    /// Delete the given rows, then rebuild indexes over the compacted rows
    pub fn delete_rows(&mut self, row_ids: &HashSet<RowId>) -> usize {
        let before = self.rows.len();
        let mut position = 0;
        self.rows.retain(|_| {
            let keep = !row_ids.contains(&RowId(position));
            position += 1;
            keep
        });
        self.rebuild_indexes();
        before - self.rows.len()
    }

    /// Drop rows beyond `len`; used to back out a partially applied insert
    pub fn truncate(&mut self, len: usize) {
        if len < self.rows.len() {
            self.rows.truncate(len);
            self.rebuild_indexes();
        }
    }

    /// Remove all rows
    pub fn clear(&mut self) {
        self.rows.clear();
        self.rebuild_indexes();
    }
}

fn ids_of(entries: Vec<(Value, RowId)>) -> Vec<RowId> {
    entries.into_iter().map(|(_, id)| id).collect()
}
