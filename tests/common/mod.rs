#![allow(dead_code)]

use quarrydb::sql::*;
use quarrydb::storage::{Row, Value};
use quarrydb::{ExecutionEngine, QueryResult, Result};

pub fn create_students(engine: &mut ExecutionEngine) {
    engine
        .execute(Statement::CreateTable(CreateTableStatement {
            table_name: "students".to_string(),
            columns: vec![
                ColumnDef::new("id", "INT").primary_key(),
                ColumnDef::new("name", "TEXT"),
                ColumnDef::new("age", "INT"),
            ],
            constraints: vec![],
        }))
        .unwrap();
}

pub fn create_enrollments(engine: &mut ExecutionEngine, cascade: bool) {
    engine
        .execute(Statement::CreateTable(CreateTableStatement {
            table_name: "enrollments".to_string(),
            columns: vec![
                ColumnDef::new("enrollment_id", "INT"),
                ColumnDef::new("student_id", "INT"),
                ColumnDef::new("course", "TEXT"),
            ],
            constraints: vec![
                TableConstraint::PrimaryKey {
                    columns: vec!["enrollment_id".to_string()],
                },
                TableConstraint::ForeignKey {
                    columns: vec!["student_id".to_string()],
                    ref_table: "students".to_string(),
                    ref_columns: vec!["id".to_string()],
                    cascade,
                },
            ],
        }))
        .unwrap();
}

pub fn insert(engine: &mut ExecutionEngine, table: &str, values: Vec<Vec<Expr>>) -> Result<QueryResult> {
    engine.execute(Statement::Insert(InsertStatement {
        table_name: table.to_string(),
        columns: None,
        values,
    }))
}

pub fn student(id: i64, name: &str, age: i64) -> Vec<Expr> {
    vec![Expr::int(id), Expr::text(name), Expr::int(age)]
}

pub fn enrollment(id: i64, student_id: i64, course: &str) -> Vec<Expr> {
    vec![Expr::int(id), Expr::int(student_id), Expr::text(course)]
}

/// students (1 Alice 20), (2 Bob 21), (3 Carol 22) and their enrollments
pub fn school(engine: &mut ExecutionEngine, cascade: bool) {
    create_students(engine);
    create_enrollments(engine, cascade);
    insert(
        engine,
        "students",
        vec![student(1, "Alice", 20), student(2, "Bob", 21), student(3, "Carol", 22)],
    )
    .unwrap();
    insert(
        engine,
        "enrollments",
        vec![
            enrollment(10, 1, "Math"),
            enrollment(11, 2, "Math"),
            enrollment(12, 1, "Art"),
            enrollment(13, 3, "History"),
        ],
    )
    .unwrap();
}

pub fn delete_where(engine: &mut ExecutionEngine, table: &str, predicate: Expr) -> Result<QueryResult> {
    engine.execute(Statement::Delete(DeleteStatement {
        table_name: table.to_string(),
        where_clause: Some(predicate),
    }))
}

pub fn keys(engine: &ExecutionEngine, table: &str) -> Vec<i64> {
    let table = engine.catalog().get_table(table).unwrap();
    let mut keys: Vec<i64> = table
        .scan()
        .filter_map(|(_, row)| row.get(table.primary_key()).and_then(Value::as_i64))
        .collect();
    keys.sort();
    keys
}

pub fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter().filter_map(|r| r.get(name).cloned()).collect()
}
