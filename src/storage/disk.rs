//! On-disk layout for QuarryDB
//!
//! A schema is one directory. Each table has its own subdirectory holding
//! `meta.json` (name, columns, primary key, indexed columns) and
//! `rows.csv` (header row in column order, one record per row). The
//! schema-level `foreign_keys.json` maps each referenced table to the
//! foreign keys pointing at it. Index contents are never written.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::row::{Row, Value};
use super::table::Table;
use crate::catalog::{validate_identifier, Column, DataType, ForeignKeyRef, TableDef};
use crate::error::{Error, Result};

const META_FILE: &str = "meta.json";
const ROWS_FILE: &str = "rows.csv";
const FOREIGN_KEYS_FILE: &str = "foreign_keys.json";

/// Metadata record of one persisted table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: String,
    /// Columns carrying a secondary index
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableMeta {
    fn of(table: &Table) -> Self {
        let def = table.definition();
        Self {
            name: def.name.clone(),
            columns: def.columns.clone(),
            primary_key: def.primary_key.clone(),
            indexes: table
                .indexed_columns()
                .into_iter()
                .filter(|c| *c != def.primary_key)
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Write one table's metadata and rows under `schema_dir/<table>`
pub fn write_table(schema_dir: &Path, table: &Table) -> Result<()> {
    let table_dir = schema_dir.join(table.name());
    fs::create_dir_all(&table_dir)?;

    let meta = TableMeta::of(table);
    fs::write(table_dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;

    let mut writer = csv::Writer::from_path(table_dir.join(ROWS_FILE))?;
    writer.write_record(meta.columns.iter().map(|c| c.name.as_str()))?;
    for row in table.select_all() {
        let record: Vec<String> = meta
            .columns
            .iter()
            .map(|c| match row.get(&c.name) {
                Some(Value::Null) | None => String::new(),
                Some(value) => value.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Read a table back from its directory. Rows are re-inserted, so the
/// primary-key index is reconstructed and row types are checked.
pub fn read_table(table_dir: &Path) -> Result<Table> {
    let meta_json = fs::read_to_string(table_dir.join(META_FILE))?;
    let meta: TableMeta = serde_json::from_str(&meta_json)?;

    let def = TableDef::new(meta.name.clone(), meta.columns.clone(), meta.primary_key.clone())
        .map_err(|e| Error::Corrupted(format!("table '{}': {}", meta.name, e)))?;
    let mut table = Table::new(def);

    let rows_path = table_dir.join(ROWS_FILE);
    if rows_path.exists() {
        let mut reader = csv::Reader::from_path(&rows_path)?;

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let expected: Vec<String> = meta.columns.iter().map(|c| c.name.clone()).collect();
        if header != expected {
            return Err(Error::Corrupted(format!(
                "table '{}': row header {:?} does not match columns {:?}",
                meta.name, header, expected
            )));
        }

        for record in reader.records() {
            let record = record?;
            let row = parse_record(&meta, &record)?;
            table
                .insert(row)
                .map_err(|e| Error::Corrupted(format!("table '{}': {}", meta.name, e)))?;
        }
    }

    for column in &meta.indexes {
        table
            .create_index(column)
            .map_err(|e| Error::Corrupted(format!("table '{}': {}", meta.name, e)))?;
    }

    Ok(table)
}

fn parse_record(meta: &TableMeta, record: &csv::StringRecord) -> Result<Row> {
    meta.columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let field = record.get(i).ok_or_else(|| {
                Error::Corrupted(format!("table '{}': short row {:?}", meta.name, record))
            })?;
            let value = match col.data_type {
                DataType::Int => field.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
                    Error::Corrupted(format!(
                        "table '{}': '{}' is not an integer in column '{}'",
                        meta.name, field, col.name
                    ))
                })?,
                DataType::Text => Value::Text(field.to_string()),
            };
            Ok((col.name.clone(), value))
        })
        .collect()
}

/// Table subdirectories of a schema directory, sorted by name
pub fn table_dirs(schema_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !schema_dir.exists() {
        return Ok(dirs);
    }
    for entry in fs::read_dir(schema_dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(META_FILE).exists() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Remove a table's persisted files
pub fn remove_table_dir(schema_dir: &Path, name: &str) -> Result<()> {
    validate_identifier("table", name)?;
    let table_dir = schema_dir.join(name);
    if table_dir.exists() {
        fs::remove_dir_all(table_dir)?;
    }
    Ok(())
}

/// Write the foreign-key reverse map
pub fn write_foreign_keys(
    schema_dir: &Path,
    referenced_by: &IndexMap<String, Vec<ForeignKeyRef>>,
) -> Result<()> {
    fs::create_dir_all(schema_dir)?;
    fs::write(
        schema_dir.join(FOREIGN_KEYS_FILE),
        serde_json::to_string_pretty(referenced_by)?,
    )?;
    Ok(())
}

/// Read the foreign-key reverse map; a schema without the file has none
pub fn read_foreign_keys(schema_dir: &Path) -> Result<IndexMap<String, Vec<ForeignKeyRef>>> {
    let path = schema_dir.join(FOREIGN_KEYS_FILE);
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| Error::Corrupted(format!("{}: {}", FOREIGN_KEYS_FILE, e)))
}
