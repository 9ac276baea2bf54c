//! Schema catalog for QuarryDB
//!
//! The catalog owns every table of one schema and the reverse map of
//! foreign-key edges: for each referenced table, the foreign keys that
//! point at it. That map is the only record of referential edges.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::Path;

use super::schema::{Column, ForeignKey, ForeignKeyRef, TableDef};
use super::types::DataType;
use crate::error::{Error, Result};
use crate::storage::{disk, Table};

/// Schema catalog: tables plus foreign-key reverse map
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Schema name
    name: String,
    /// Tables by name, in creation order
    tables: IndexMap<String, Table>,
    /// Referenced table -> foreign keys pointing at it
    referenced_by: IndexMap<String, Vec<ForeignKeyRef>>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: IndexMap::new(),
            referenced_by: IndexMap::new(),
        }
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new table
    pub fn create_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(Error::TableAlreadyExists(table.name().to_string()));
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Get a table by name for mutation
    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// List all table names, in creation order
    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    /// Record that `referencing_table` declares `foreign_key`
    pub fn add_foreign_key(&mut self, referencing_table: &str, foreign_key: ForeignKey) {
        self.referenced_by
            .entry(foreign_key.referenced_table.clone())
            .or_default()
            .push(ForeignKeyRef {
                referencing_table: referencing_table.to_string(),
                foreign_key,
            });
    }

    /// Foreign keys pointing at `table`
    pub fn references_to(&self, table: &str) -> &[ForeignKeyRef] {
        self.referenced_by
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Foreign keys declared by `table`
    pub fn foreign_keys_of(&self, table: &str) -> Vec<&ForeignKey> {
        self.referenced_by
            .values()
            .flatten()
            .filter(|r| r.referencing_table == table)
            .map(|r| &r.foreign_key)
            .collect()
    }

    /// The full reverse map
    pub fn referenced_by(&self) -> &IndexMap<String, Vec<ForeignKeyRef>> {
        &self.referenced_by
    }

    /// Drop a table. Referencing tables block the drop unless `cascade` is
    /// requested or every reference to the table is CASCADE, in which case
    /// they are dropped first, transitively. Returns the dropped tables in
    /// drop order. Nothing is removed unless the whole plan is valid.
    pub fn drop_table(&mut self, name: &str, cascade: bool) -> Result<Vec<String>> {
        if !self.table_exists(name) {
            return Err(Error::TableNotFound(name.to_string()));
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.plan_drop(name, cascade, &mut visited, &mut order)?;

        for table in &order {
            self.tables.shift_remove(table);
            self.purge_references(table);
            tracing::info!(schema = %self.name, table = %table, "dropped table");
        }
        Ok(order)
    }

    fn plan_drop(
        &self,
        name: &str,
        cascade: bool,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        visited.insert(name.to_string());

        let referencers: Vec<&ForeignKeyRef> = self
            .references_to(name)
            .iter()
            .filter(|r| r.referencing_table != name)
            .collect();

        if !cascade && referencers.iter().any(|r| !r.foreign_key.policy.is_cascade()) {
            let mut names: Vec<String> = Vec::new();
            for r in &referencers {
                if !names.contains(&r.referencing_table) {
                    names.push(r.referencing_table.clone());
                }
            }
            return Err(Error::ReferentialRestriction {
                table: name.to_string(),
                referenced_by: names,
            });
        }

        for r in referencers {
            if !visited.contains(&r.referencing_table) {
                self.plan_drop(&r.referencing_table, cascade, visited, order)?;
            }
        }
        order.push(name.to_string());
        Ok(())
    }

    fn purge_references(&mut self, table: &str) {
        self.referenced_by.shift_remove(table);
        for refs in self.referenced_by.values_mut() {
            refs.retain(|r| r.referencing_table != table);
        }
        self.referenced_by.retain(|_, refs| !refs.is_empty());
    }

    /// Save every table plus the foreign-key map under `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for table in self.tables.values() {
            disk::write_table(dir, table)?;
        }
        disk::write_foreign_keys(dir, &self.referenced_by)?;
        tracing::debug!(schema = %self.name, tables = self.tables.len(), "saved schema");
        Ok(())
    }

    /// Load a schema from `dir`: tables first, then the foreign-key map,
    /// then indexes rebuilt from the loaded rows
    pub fn load(dir: &Path, name: impl Into<String>) -> Result<Self> {
        let mut catalog = Self::new(name);

        for table_dir in disk::table_dirs(dir)? {
            let table = disk::read_table(&table_dir)?;
            catalog.create_table(table)?;
        }

        let referenced_by = disk::read_foreign_keys(dir)?;
        for (referenced, refs) in &referenced_by {
            for r in refs {
                catalog.validate_loaded_reference(referenced, r)?;
            }
        }
        catalog.referenced_by = referenced_by;

        for table in catalog.tables.values_mut() {
            table.rebuild_indexes();
        }

        tracing::info!(
            schema = %catalog.name,
            tables = catalog.tables.len(),
            "loaded schema"
        );
        Ok(catalog)
    }

    fn validate_loaded_reference(&self, referenced: &str, r: &ForeignKeyRef) -> Result<()> {
        let fk = &r.foreign_key;
        let corrupted = |reason: &str| {
            Error::Corrupted(format!(
                "foreign key {}.{} -> {}.{}: {}",
                r.referencing_table, fk.local_column, fk.referenced_table, fk.referenced_column, reason
            ))
        };

        if fk.referenced_table != referenced {
            return Err(corrupted("listed under the wrong table"));
        }
        let parent = self
            .tables
            .get(referenced)
            .ok_or_else(|| corrupted("referenced table is missing"))?;
        if parent.primary_key() != fk.referenced_column {
            return Err(corrupted("referenced column is not the primary key"));
        }
        let child = self
            .tables
            .get(&r.referencing_table)
            .ok_or_else(|| corrupted("referencing table is missing"))?;
        if !child.definition().has_column(&fk.local_column) {
            return Err(corrupted("local column is missing"));
        }
        Ok(())
    }

    /// Human-readable description of a table
    pub fn describe_table(&self, name: &str) -> Result<String> {
        let table = self.get_table(name)?;
        let def = table.definition();
        let mut info = format!("Table: {} ({} rows)\n", def.name, table.len());
        info.push_str("Columns:\n");

        for col in &def.columns {
            let flags = if col.name == def.primary_key {
                " [PRIMARY KEY]"
            } else {
                ""
            };
            info.push_str(&format!("  {} {}{}\n", col.name, col.data_type, flags));
        }

        let secondary: Vec<&str> = table
            .indexed_columns()
            .into_iter()
            .filter(|c| *c != def.primary_key)
            .collect();
        if !secondary.is_empty() {
            info.push_str("Indexes:\n");
            for column in secondary {
                info.push_str(&format!("  {}\n", column));
            }
        }

        let fks = self.foreign_keys_of(name);
        if !fks.is_empty() {
            info.push_str("Foreign keys:\n");
            for fk in fks {
                info.push_str(&format!(
                    "  {} -> {}({}) {}\n",
                    fk.local_column, fk.referenced_table, fk.referenced_column, fk.policy
                ));
            }
        }

        Ok(info)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Builder for creating tables with a fluent API
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<String>,
}

impl TableBuilder {
    /// Start building a new table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
        }
    }

    /// Add a column
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Add the primary key column
    pub fn primary_key(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        self.primary_key = Some(name.clone());
        self.columns.push(Column::new(name, data_type));
        self
    }

    /// Build the table in the catalog
    pub fn build(self, catalog: &mut Catalog) -> Result<()> {
        let primary_key = self.primary_key.ok_or_else(|| Error::PrimaryKeyMissing {
            table: self.name.clone(),
            found: 0,
        })?;
        let def = TableDef::new(self.name, self.columns, primary_key)?;
        catalog.create_table(Table::new(def))
    }
}
