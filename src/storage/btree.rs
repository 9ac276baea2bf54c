//! B+ Tree Index for QuarryDB
//!
//! This module implements the ordered index over one column. Each distinct
//! key maps to the list of row ids holding that value; a unique tree (used
//! for primary keys) refuses a second row id for an existing key.
//!
//! Deletion only removes entries from leaves and never merges nodes, so
//! separator keys in internal nodes may outlive the keys they were copied
//! from. They remain valid routing bounds. Callers that delete in bulk
//! rebuild the tree instead.

use std::ops::Bound;

use super::row::Value;
use super::table::RowId;
use crate::error::{Error, Result};

const ORDER: usize = 16;

/// B+ Tree Node
#[derive(Debug, Clone)]
enum BPlusNode {
    /// Internal node: child `i` holds keys in `[keys[i-1], keys[i])`
    Internal {
        keys: Vec<Value>,
        children: Vec<BPlusNode>,
    },
    /// Leaf node with keys and their row ids
    Leaf {
        keys: Vec<Value>,
        values: Vec<Vec<RowId>>,
    },
}

/// B+ Tree Index
#[derive(Debug, Clone)]
pub struct BPlusTree {
    /// Root node
    root: BPlusNode,
    /// Number of (key, row id) entries
    size: usize,
    /// Reject a second row id for an existing key
    unique: bool,
    /// Index name, used in error messages
    pub name: String,
}

impl BPlusTree {
    /// Create a new empty tree allowing duplicate keys
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: BPlusNode::Leaf {
                keys: Vec::new(),
                values: Vec::new(),
            },
            size: 0,
            unique: false,
            name: name.into(),
        }
    }

    /// Create a new empty unique tree
    pub fn new_unique(name: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name)
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Insert a key / row id pair into the tree
    pub fn insert(&mut self, key: Value, row_id: RowId) -> Result<()> {
        if self.unique && !self.search(&key).is_empty() {
            return Err(Error::DuplicateKey {
                relation: self.name.clone(),
                key: key.to_string(),
            });
        }

        if let Some((new_node, mid_key)) = Self::insert_recursive(&mut self.root, key, row_id) {
            // Root split, create new root
            let old_root = std::mem::replace(
                &mut self.root,
                BPlusNode::Leaf {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
            );
            self.root = BPlusNode::Internal {
                keys: vec![mid_key],
                children: vec![old_root, new_node],
            };
        }

        self.size += 1;
        Ok(())
    }

    fn insert_recursive(
        node: &mut BPlusNode,
        key: Value,
        row_id: RowId,
    ) -> Option<(BPlusNode, Value)> {
        match node {
            BPlusNode::Leaf { keys, values } => {
                match keys.binary_search(&key) {
                    Ok(pos) => {
                        values[pos].push(row_id);
                        return None;
                    }
                    Err(pos) => {
                        keys.insert(pos, key);
                        values.insert(pos, vec![row_id]);
                    }
                }

                if keys.len() > ORDER {
                    let mid = keys.len() / 2;
                    let new_keys = keys.split_off(mid);
                    let new_values = values.split_off(mid);
                    let mid_key = new_keys[0].clone();

                    return Some((
                        BPlusNode::Leaf {
                            keys: new_keys,
                            values: new_values,
                        },
                        mid_key,
                    ));
                }
                None
            }
            BPlusNode::Internal { keys, children } => {
                let pos = keys.partition_point(|k| k <= &key);
                if let Some((new_node, mid_key)) =
                    Self::insert_recursive(&mut children[pos], key, row_id)
                {
                    keys.insert(pos, mid_key);
                    children.insert(pos + 1, new_node);

                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let mid_key = keys[mid].clone();
                        let new_keys = keys.split_off(mid + 1);
                        keys.pop(); // Remove mid_key from left node
                        let new_children = children.split_off(mid + 1);

                        return Some((
                            BPlusNode::Internal {
                                keys: new_keys,
                                children: new_children,
                            },
                            mid_key,
                        ));
                    }
                }
                None
            }
        }
    }

    /// Row ids stored under `key` (empty if absent)
    pub fn search(&self, key: &Value) -> &[RowId] {
        let mut curr = &self.root;
        loop {
            match curr {
                BPlusNode::Leaf { keys, values } => {
                    return match keys.binary_search(key) {
                        Ok(pos) => &values[pos],
                        Err(_) => &[],
                    };
                }
                BPlusNode::Internal { keys, children } => {
                    curr = &children[keys.partition_point(|k| k <= key)];
                }
            }
        }
    }

    /// Remove one (key, row id) entry. Returns whether it was present.
    pub fn remove(&mut self, key: &Value, row_id: RowId) -> bool {
        let removed = Self::remove_recursive(&mut self.root, key, row_id);
        if removed {
            self.size -= 1;
        }
        removed
    }

    fn remove_recursive(node: &mut BPlusNode, key: &Value, row_id: RowId) -> bool {
        match node {
            BPlusNode::Leaf { keys, values } => {
                let Ok(pos) = keys.binary_search(key) else {
                    return false;
                };
                let Some(at) = values[pos].iter().position(|r| *r == row_id) else {
                    return false;
                };
                values[pos].remove(at);
                if values[pos].is_empty() {
                    keys.remove(pos);
                    values.remove(pos);
                }
                true
            }
            BPlusNode::Internal { keys, children } => {
                let pos = keys.partition_point(|k| k <= key);
                Self::remove_recursive(&mut children[pos], key, row_id)
            }
        }
    }

    /// Range scan in key order over the given bounds
    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> Vec<(Value, RowId)> {
        let mut result = Vec::new();
        Self::range_recursive(&self.root, lower, upper, &mut result);
        result
    }

    fn range_recursive(
        node: &BPlusNode,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
        result: &mut Vec<(Value, RowId)>,
    ) {
        match node {
            BPlusNode::Leaf { keys, values } => {
                for (key, row_ids) in keys.iter().zip(values) {
                    let above_lower = match lower {
                        Bound::Included(l) => key >= l,
                        Bound::Excluded(l) => key > l,
                        Bound::Unbounded => true,
                    };
                    let below_upper = match upper {
                        Bound::Included(u) => key <= u,
                        Bound::Excluded(u) => key < u,
                        Bound::Unbounded => true,
                    };
                    if above_lower && below_upper {
                        result.extend(row_ids.iter().map(|r| (key.clone(), *r)));
                    }
                }
            }
            BPlusNode::Internal { keys, children } => {
                // First child that may hold keys >= lower
                let start = match lower {
                    Bound::Included(l) | Bound::Excluded(l) => keys.partition_point(|k| k <= l),
                    Bound::Unbounded => 0,
                };
                // Last child that may hold keys <= upper
                let end = match upper {
                    Bound::Included(u) | Bound::Excluded(u) => keys.partition_point(|k| k <= u),
                    Bound::Unbounded => keys.len(),
                };

                for child in children.iter().take(end + 1).skip(start) {
                    Self::range_recursive(child, lower, upper, result);
                }
            }
        }
    }

    /// Get all entries in the tree (sorted)
    pub fn scan_all(&self) -> Vec<(Value, RowId)> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Number of (key, row id) entries in the tree
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}
