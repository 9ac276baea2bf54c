//! Query Executor for QuarryDB
//!
//! This module executes statements against the catalog and returns
//! results. Every statement validates completely before it mutates
//! anything, so a failing statement leaves all tables as they were. After
//! a successful mutating statement the whole catalog is saved.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;

use super::optimizer::HeuristicOptimizer;
use super::select::{execute_select, matching_row_ids};
use crate::catalog::{
    validate_identifier, Catalog, Column, DataType, FkPolicy, ForeignKey, TableDef,
};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::sql::ast::*;
use crate::sql::SqlParser;
use crate::storage::{disk, Row, RowId, Table, Value};

/// Query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub affected_rows: usize,
    /// Message
    pub message: Option<String>,
}

impl QueryResult {
    /// Create a new empty result
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            message: None,
        }
    }

    /// Create a result with a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Create a result with affected rows count
    pub fn with_affected_rows(count: usize, message: impl Into<String>) -> Self {
        Self {
            affected_rows: count,
            message: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Create a result holding query rows
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            columns,
            rows,
            ..Self::empty()
        }
    }
}

/// Execution Engine
#[derive(Debug)]
pub struct ExecutionEngine {
    /// Schema catalog
    catalog: Catalog,
    /// Engine configuration
    config: DatabaseConfig,
    /// Join and predicate heuristics
    optimizer: HeuristicOptimizer,
}

impl ExecutionEngine {
    /// Create an engine, loading the configured schema when it exists on
    /// disk and persistence is enabled
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let schema_dir = config.schema_dir();
        if config.persist {
            validate_identifier("schema", &config.schema)?;
        }
        let catalog = if config.persist && schema_dir.exists() {
            Catalog::load(&schema_dir, config.schema.clone())?
        } else {
            Catalog::new(config.schema.clone())
        };

        Ok(Self {
            catalog,
            optimizer: HeuristicOptimizer::new(config.sort_merge_threshold),
            config,
        })
    }

    /// An engine that never touches disk
    pub fn in_memory() -> Self {
        let config = DatabaseConfig::in_memory();
        Self {
            catalog: Catalog::new(config.schema.clone()),
            optimizer: HeuristicOptimizer::new(config.sort_merge_threshold),
            config,
        }
    }

    /// The schema catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Execute a statement
    pub fn execute(&mut self, stmt: Statement) -> Result<QueryResult> {
        let span = tracing::info_span!("statement", kind = stmt.kind());
        let _enter = span.enter();

        let mutating = stmt.is_mutating();
        // A failed save must not leave the change behind in memory
        let snapshot = (mutating && self.config.persist).then(|| self.catalog.clone());

        let result = match stmt {
            Statement::Select(select) => self.query(&select),
            Statement::CreateTable(create) => self.execute_create_table(create),
            Statement::CreateIndex(create) => self.execute_create_index(create),
            Statement::Insert(insert) => self.execute_insert(insert),
            Statement::Update(update) => self.execute_update(update),
            Statement::Delete(delete) => self.execute_delete(delete),
            Statement::DropTable(drop) => self.execute_drop_table(drop),
        };

        let result = match result {
            Ok(done) if mutating => self.save().map(|()| done),
            other => other,
        };

        if let Err(e) = &result {
            tracing::debug!(error = %e, "statement failed");
            if let Some(snapshot) = snapshot {
                tracing::warn!(error = %e, "restoring catalog after failed statement");
                self.catalog = snapshot;
            }
        }
        result
    }

    /// Parse SQL text with an external parser and execute each statement
    /// in order, stopping at the first failure
    pub fn execute_sql<P: SqlParser>(&mut self, parser: &P, sql: &str) -> Result<Vec<QueryResult>> {
        let statements = parser
            .parse(sql)
            .map_err(|e| Error::ParseDelegation(Box::new(e)))?;
        statements
            .into_iter()
            .map(|stmt| self.execute(stmt))
            .collect()
    }

    /// Run a SELECT; never mutates
    pub fn query(&self, stmt: &SelectStatement) -> Result<QueryResult> {
        let rows = execute_select(&self.catalog, &self.optimizer, stmt)?;
        Ok(QueryResult::with_rows(rows))
    }

    /// Save the catalog when persistence is enabled
    pub fn save(&self) -> Result<()> {
        if self.config.persist {
            self.catalog.save(&self.config.schema_dir())?;
        }
        Ok(())
    }

    fn execute_create_table(&mut self, stmt: CreateTableStatement) -> Result<QueryResult> {
        let table_name = stmt.table_name;
        if self.catalog.table_exists(&table_name) {
            return Err(Error::TableAlreadyExists(table_name));
        }

        // Columns; only INT and TEXT are accepted
        let mut columns = Vec::with_capacity(stmt.columns.len());
        let mut primary_keys: Vec<String> = Vec::new();
        for col_def in &stmt.columns {
            let data_type = DataType::from_str(&col_def.data_type)?;
            columns.push(Column::new(col_def.name.clone(), data_type));
            if col_def.primary_key && !primary_keys.contains(&col_def.name) {
                primary_keys.push(col_def.name.clone());
            }
        }

        let mut foreign_keys = Vec::new();
        for constraint in &stmt.constraints {
            match constraint {
                TableConstraint::PrimaryKey { columns } => {
                    for column in columns {
                        if !primary_keys.contains(column) {
                            primary_keys.push(column.clone());
                        }
                    }
                }
                TableConstraint::ForeignKey {
                    columns,
                    ref_table,
                    ref_columns,
                    cascade,
                } => foreign_keys.push((columns, ref_table, ref_columns, *cascade)),
            }
        }

        let primary_key = match primary_keys.as_slice() {
            [single] => single.clone(),
            other => {
                return Err(Error::PrimaryKeyMissing {
                    table: table_name,
                    found: other.len(),
                })
            }
        };
        let def = TableDef::new(table_name.clone(), columns, primary_key)?;

        let foreign_keys = foreign_keys
            .into_iter()
            .map(|(columns, ref_table, ref_columns, cascade)| {
                self.validate_foreign_key(&def, columns, ref_table, ref_columns, cascade)
            })
            .collect::<Result<Vec<ForeignKey>>>()?;

        self.catalog.create_table(Table::new(def))?;
        for fk in foreign_keys {
            tracing::info!(
                table = %table_name,
                column = %fk.local_column,
                references = %fk.referenced_table,
                policy = %fk.policy,
                "registered foreign key"
            );
            self.catalog.add_foreign_key(&table_name, fk);
        }

        tracing::info!(table = %table_name, "created table");
        Ok(QueryResult::with_message(format!(
            "Table '{}' created",
            table_name
        )))
    }

    fn validate_foreign_key(
        &self,
        def: &TableDef,
        columns: &[String],
        ref_table: &str,
        ref_columns: &[String],
        cascade: bool,
    ) -> Result<ForeignKey> {
        let local_column = match columns {
            [single] if ref_columns.len() <= 1 => single,
            _ => {
                return Err(Error::MultiColumnForeignKeyUnsupported(format!(
                    "({}) REFERENCES {}({})",
                    columns.join(", "),
                    ref_table,
                    ref_columns.join(", ")
                )))
            }
        };
        let local = def
            .get_column(local_column)
            .ok_or_else(|| Error::ColumnNotFound(local_column.clone(), def.name.clone()))?;

        let invalid = |column: &str, reason: &str| Error::InvalidForeignKeyTarget {
            table: ref_table.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        };

        let parent = self
            .catalog
            .get_table(ref_table)
            .map_err(|_| invalid(ref_columns.first().map_or("", String::as_str), "table does not exist"))?;
        let parent_key = parent.definition().primary_key_column();
        let referenced_column = ref_columns
            .first()
            .cloned()
            .unwrap_or_else(|| parent_key.name.clone());

        if referenced_column != parent_key.name {
            return Err(invalid(&referenced_column, "not the primary key"));
        }
        if parent_key.data_type != local.data_type {
            return Err(invalid(
                &referenced_column,
                &format!(
                    "type {} does not match {} column '{}'",
                    parent_key.data_type, local.data_type, local.name
                ),
            ));
        }

        let policy = if cascade {
            FkPolicy::Cascade
        } else {
            FkPolicy::Restrict
        };
        Ok(ForeignKey::new(
            local_column.clone(),
            ref_table,
            referenced_column,
            policy,
        ))
    }

    fn execute_create_index(&mut self, stmt: CreateIndexStatement) -> Result<QueryResult> {
        let table = self.catalog.get_table_mut(&stmt.table_name)?;
        table.create_index(&stmt.column)?;

        let name = stmt
            .index_name
            .unwrap_or_else(|| format!("{}_{}_idx", stmt.table_name, stmt.column));
        Ok(QueryResult::with_message(format!(
            "Index '{}' created on '{}'({})",
            name, stmt.table_name, stmt.column
        )))
    }

    fn execute_insert(&mut self, stmt: InsertStatement) -> Result<QueryResult> {
        let table_name = stmt.table_name;
        let table = self.catalog.get_table(&table_name)?;
        let def = table.definition().clone();

        let targets: Vec<&Column> = match &stmt.columns {
            Some(names) => {
                let mut seen = HashSet::new();
                names
                    .iter()
                    .map(|name| {
                        if !seen.insert(name) {
                            return Err(Error::InvalidQuery(format!(
                                "column '{}' listed twice",
                                name
                            )));
                        }
                        def.get_column(name)
                            .ok_or_else(|| Error::ColumnNotFound(name.clone(), table_name.clone()))
                    })
                    .collect::<Result<_>>()?
            }
            None => def.columns.iter().collect(),
        };

        // Build and check every row before touching the table
        let mut rows = Vec::with_capacity(stmt.values.len());
        let mut batch_keys = HashSet::new();
        for values in &stmt.values {
            if values.len() != targets.len() {
                return Err(Error::InvalidQuery(format!(
                    "{} values for {} columns",
                    values.len(),
                    targets.len()
                )));
            }
            let mut row = Row::new();
            for (col, expr) in targets.iter().zip(values) {
                row.insert(col.name.clone(), coerce_literal(expr, col)?);
            }
            table.validate_row(&row)?;

            if let Some(key) = row.get(&def.primary_key) {
                if table.select_by_key(key).is_some() || !batch_keys.insert(key.clone()) {
                    return Err(Error::DuplicateKey {
                        relation: table_name.clone(),
                        key: key.to_string(),
                    });
                }
            }
            self.check_parent_keys(&table_name, &row, None)?;
            rows.push(row);
        }

        let table = self.catalog.get_table_mut(&table_name)?;
        let before = table.len();
        for row in rows {
            if let Err(e) = table.insert(row) {
                table.truncate(before);
                return Err(e);
            }
        }

        let inserted = table.len() - before;
        tracing::debug!(table = %table_name, rows = inserted, "inserted rows");
        Ok(QueryResult::with_affected_rows(
            inserted,
            format!("{} row(s) inserted", inserted),
        ))
    }

    /// Every foreign-key column of `row` (restricted to `only` when given)
    /// must name an existing parent key
    fn check_parent_keys(
        &self,
        table_name: &str,
        row: &Row,
        only: Option<&HashSet<String>>,
    ) -> Result<()> {
        for fk in self.catalog.foreign_keys_of(table_name) {
            if only.map_or(false, |cols| !cols.contains(&fk.local_column)) {
                continue;
            }
            let Some(value) = row.get(&fk.local_column) else {
                continue;
            };
            let parent = self.catalog.get_table(&fk.referenced_table)?;
            if parent.select_by_key(value).is_none() {
                return Err(Error::ForeignKeyViolation(format!(
                    "{}.{} = {} has no match in {}.{}",
                    table_name, fk.local_column, value, fk.referenced_table, fk.referenced_column
                )));
            }
        }
        Ok(())
    }

    fn execute_update(&mut self, stmt: UpdateStatement) -> Result<QueryResult> {
        let table_name = stmt.table_name;
        let table = self.catalog.get_table(&table_name)?;
        let def = table.definition();

        let mut assignments: IndexMap<String, Value> = IndexMap::new();
        for assignment in &stmt.assignments {
            let column = def.get_column(&assignment.column).ok_or_else(|| {
                Error::ColumnNotFound(assignment.column.clone(), table_name.clone())
            })?;
            assignments.insert(column.name.clone(), coerce_literal(&assignment.value, column)?);
        }
        let assigned: HashSet<String> = assignments.keys().cloned().collect();

        let targets = matching_row_ids(&self.optimizer, table, stmt.where_clause.as_ref())?;
        let target_set: HashSet<RowId> = targets.iter().copied().collect();

        let mut updates = Vec::with_capacity(targets.len());
        let mut key_changed = false;
        for row_id in &targets {
            let old = table
                .get(*row_id)
                .ok_or_else(|| Error::Internal(format!("row {:?} vanished", row_id)))?;
            let mut new = old.clone();
            for (column, value) in &assignments {
                new.insert(column.clone(), value.clone());
            }

            let old_key = old.get(&def.primary_key);
            let new_key = new.get(&def.primary_key);
            if old_key != new_key {
                key_changed = true;
                // No other live row may already hold the new key
                if let Some(key) = new_key {
                    let holders = table.find_rows(&def.primary_key, key);
                    if holders.iter().any(|id| !target_set.contains(id)) {
                        return Err(Error::DuplicateKey {
                            relation: table_name.clone(),
                            key: key.to_string(),
                        });
                    }
                }
                // Referenced keys never change, whatever the policy
                if let Some(key) = old_key {
                    let blocking = self.referencing_tables(&table_name, key)?;
                    if !blocking.is_empty() {
                        return Err(Error::ReferentialRestriction {
                            table: table_name.clone(),
                            referenced_by: blocking,
                        });
                    }
                }
            }

            self.check_parent_keys(&table_name, &new, Some(&assigned))?;
            updates.push((*row_id, new));
        }

        let count = updates.len();
        let table = self.catalog.get_table_mut(&table_name)?;
        if key_changed {
            table.replace_rows(updates)?;
        } else {
            for (row_id, row) in updates {
                table.update(row_id, row)?;
            }
        }

        tracing::debug!(table = %table_name, rows = count, "updated rows");
        Ok(QueryResult::with_affected_rows(
            count,
            format!("{} row(s) updated", count),
        ))
    }

    /// Tables holding a row that references `key` of `table_name`
    fn referencing_tables(&self, table_name: &str, key: &Value) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        for r in self.catalog.references_to(table_name) {
            let child = self.catalog.get_table(&r.referencing_table)?;
            if !child.find_rows(&r.foreign_key.local_column, key).is_empty()
                && !tables.contains(&r.referencing_table)
            {
                tables.push(r.referencing_table.clone());
            }
        }
        Ok(tables)
    }

    fn execute_delete(&mut self, stmt: DeleteStatement) -> Result<QueryResult> {
        let table_name = stmt.table_name;
        let table = self.catalog.get_table(&table_name)?;
        let targets = matching_row_ids(&self.optimizer, table, stmt.where_clause.as_ref())?;

        let plan = self.plan_delete(&table_name, targets)?;

        let mut deleted = 0;
        for (name, ids) in &plan {
            let removed = self.catalog.get_table_mut(name)?.delete_rows(ids);
            if *name == table_name {
                deleted = removed;
            } else {
                tracing::info!(table = %name, rows = removed, "cascaded delete");
            }
        }

        tracing::debug!(table = %table_name, rows = deleted, "deleted rows");
        Ok(QueryResult::with_affected_rows(
            deleted,
            format!("{} row(s) deleted", deleted),
        ))
    }

    /// Rows to delete per table: the targets plus everything reached
    /// through CASCADE foreign keys. Fails if a RESTRICT foreign key still
    /// references a deleted key from a row outside the plan.
    fn plan_delete(
        &self,
        table_name: &str,
        targets: Vec<RowId>,
    ) -> Result<IndexMap<String, HashSet<RowId>>> {
        let mut plan: IndexMap<String, HashSet<RowId>> = IndexMap::new();
        plan.insert(table_name.to_string(), targets.iter().copied().collect());

        // Follow CASCADE edges to a fixed point
        let mut queue = vec![(table_name.to_string(), targets)];
        while let Some((parent_name, ids)) = queue.pop() {
            let keys = self.primary_keys_of(&parent_name, &ids)?;
            for r in self.catalog.references_to(&parent_name) {
                if !r.foreign_key.policy.is_cascade() {
                    continue;
                }
                let child = self.catalog.get_table(&r.referencing_table)?;
                let scheduled = plan.entry(r.referencing_table.clone()).or_default();
                let mut fresh = Vec::new();
                for key in &keys {
                    for id in child.find_rows(&r.foreign_key.local_column, key) {
                        if scheduled.insert(id) {
                            fresh.push(id);
                        }
                    }
                }
                if !fresh.is_empty() {
                    queue.push((r.referencing_table.clone(), fresh));
                }
            }
        }

        // RESTRICT references must all come from rows being deleted too
        for (parent_name, ids) in &plan {
            let ids: Vec<RowId> = ids.iter().copied().collect();
            let keys = self.primary_keys_of(parent_name, &ids)?;
            for r in self.catalog.references_to(parent_name) {
                if r.foreign_key.policy.is_cascade() {
                    continue;
                }
                let child = self.catalog.get_table(&r.referencing_table)?;
                let doomed = plan.get(&r.referencing_table);
                let blocked = keys.iter().any(|key| {
                    child
                        .find_rows(&r.foreign_key.local_column, key)
                        .iter()
                        .any(|id| !doomed.map_or(false, |d| d.contains(id)))
                });
                if blocked {
                    return Err(Error::ReferentialRestriction {
                        table: parent_name.clone(),
                        referenced_by: vec![r.referencing_table.clone()],
                    });
                }
            }
        }

        plan.retain(|_, ids| !ids.is_empty());
        Ok(plan)
    }

    fn primary_keys_of(&self, table_name: &str, ids: &[RowId]) -> Result<Vec<Value>> {
        let table = self.catalog.get_table(table_name)?;
        Ok(ids
            .iter()
            .filter_map(|id| table.get(*id))
            .filter_map(|row| row.get(table.primary_key()).cloned())
            .collect())
    }

    fn execute_drop_table(&mut self, stmt: DropTableStatement) -> Result<QueryResult> {
        if !self.catalog.table_exists(&stmt.table_name) {
            if stmt.if_exists {
                return Ok(QueryResult::with_message(format!(
                    "Table '{}' does not exist",
                    stmt.table_name
                )));
            }
            return Err(Error::TableNotFound(stmt.table_name));
        }

        let dropped = self.catalog.drop_table(&stmt.table_name, stmt.cascade)?;
        if self.config.persist {
            let schema_dir = self.config.schema_dir();
            for name in &dropped {
                disk::remove_table_dir(&schema_dir, name)?;
            }
        }

        Ok(QueryResult::with_message(format!(
            "Dropped {}",
            dropped
                .iter()
                .map(|t| format!("'{}'", t))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Convert a literal to the declared type of `column`
fn coerce_literal(expr: &Expr, column: &Column) -> Result<Value> {
    let literal = match expr {
        Expr::Literal(literal) => literal,
        Expr::Nested(inner) => return coerce_literal(inner, column),
        other => {
            return Err(Error::UnsupportedExpression(format!(
                "'{}' is not a literal value for column '{}'",
                other, column.name
            )))
        }
    };

    match (literal, column.data_type) {
        (Literal::Integer(i), DataType::Int) => Ok(Value::Integer(*i)),
        (Literal::Integer(i), DataType::Text) => Ok(Value::Text(i.to_string())),
        (Literal::String(s), DataType::Text) => Ok(Value::Text(s.clone())),
        (Literal::String(s), DataType::Int) => {
            s.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: DataType::Int.to_string(),
                    found: DataType::Text.to_string(),
                })
        }
    }
}
