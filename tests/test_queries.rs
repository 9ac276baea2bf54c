mod common;

use common::*;
use quarrydb::sql::*;
use quarrydb::storage::{Row, Value};
use quarrydb::{DatabaseConfig, Error, ExecutionEngine};

#[test]
fn test_filter_and_project() {
    let mut engine = ExecutionEngine::in_memory();
    create_students(&mut engine);
    insert(
        &mut engine,
        "students",
        vec![student(1, "Alice", 20), student(2, "Bob", 21)],
    )
    .unwrap();

    let result = engine
        .query(
            &SelectStatement::new("students")
                .columns(vec![SelectItem::expr(Expr::col("name"))])
                .filter(Expr::binary(Expr::col("age"), BinaryOperator::Gt, Expr::int(20))),
        )
        .unwrap();

    assert_eq!(result.columns, vec!["name".to_string()]);
    assert_eq!(result.rows, vec![Row::new().with("name", "Bob")]);
}

#[test]
fn test_group_by_having_count() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let result = engine
        .query(
            &SelectStatement::new("enrollments")
                .columns(vec![
                    SelectItem::expr(Expr::col("course")),
                    SelectItem::expr(Expr::count_star()),
                ])
                .group_by(vec![Expr::col("course")])
                .having(Expr::binary(Expr::count_star(), BinaryOperator::Gt, Expr::int(1))),
        )
        .unwrap();

    assert_eq!(
        result.rows,
        vec![Row::new().with("course", "Math").with("COUNT(*)", 2)]
    );
}

#[test]
fn test_aggregates_over_whole_table() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let result = engine
        .query(&SelectStatement::new("students").columns(vec![
            SelectItem::aliased(Expr::aggregate("SUM", "age".into()), "total"),
            SelectItem::aliased(Expr::aggregate("MIN", "name".into()), "first"),
            SelectItem::aliased(Expr::aggregate("MAX", "age".into()), "oldest"),
        ]))
        .unwrap();

    assert_eq!(
        result.rows,
        vec![Row::new()
            .with("total", 63)
            .with("first", "Alice")
            .with("oldest", 22)]
    );

    let unsupported = engine.query(
        &SelectStatement::new("students")
            .columns(vec![SelectItem::expr(Expr::aggregate("AVG", "age".into()))]),
    );
    assert!(matches!(unsupported, Err(Error::UnsupportedAggregate(_))));
}

#[test]
fn test_join_order_by_and_limit() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let stmt = SelectStatement::new(TableRef::aliased("students", "s"))
        .join(
            TableRef::aliased("enrollments", "e"),
            Some(Expr::eq(
                Expr::qualified("s", "id"),
                Expr::qualified("e", "student_id"),
            )),
        )
        .columns(vec![
            SelectItem::expr(Expr::qualified("s", "name")),
            SelectItem::expr(Expr::qualified("e", "course")),
        ])
        .order_by(Expr::qualified("e", "enrollment_id"), false)
        .limit(3);

    let result = engine.query(&stmt).unwrap();
    assert_eq!(result.columns, vec!["name".to_string(), "course".to_string()]);
    assert_eq!(
        result.rows,
        vec![
            Row::new().with("name", "Carol").with("course", "History"),
            Row::new().with("name", "Alice").with("course", "Art"),
            Row::new().with("name", "Bob").with("course", "Math"),
        ]
    );
}

#[test]
fn test_join_strategies_agree() {
    let build = |threshold: usize| {
        let mut engine =
            ExecutionEngine::new(DatabaseConfig::in_memory().sort_merge_threshold(threshold))
                .unwrap();
        school(&mut engine, false);
        engine
    };
    let stmt = SelectStatement::new("students")
        .join(
            "enrollments",
            Some(Expr::eq(
                Expr::qualified("enrollments", "student_id"),
                Expr::qualified("students", "id"),
            )),
        )
        .order_by(Expr::qualified("enrollments", "enrollment_id"), true);

    // A zero threshold forces sort-merge, a large one nested loop
    let merged = build(0).query(&stmt).unwrap();
    let looped = build(1000).query(&stmt).unwrap();
    assert_eq!(merged.rows.len(), 4);
    assert_eq!(merged, looped);
}

#[test]
fn test_three_way_join_filters_every_condition() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);
    engine
        .execute(Statement::CreateTable(CreateTableStatement {
            table_name: "courses".to_string(),
            columns: vec![
                ColumnDef::new("title", "TEXT").primary_key(),
                ColumnDef::new("room", "INT"),
            ],
            constraints: vec![],
        }))
        .unwrap();
    insert(
        &mut engine,
        "courses",
        vec![
            vec![Expr::text("Math"), Expr::int(101)],
            vec![Expr::text("Art"), Expr::int(202)],
        ],
    )
    .unwrap();

    let stmt = SelectStatement::new(TableRef::aliased("students", "s"))
        .join(
            TableRef::aliased("enrollments", "e"),
            Some(Expr::eq(
                Expr::qualified("s", "id"),
                Expr::qualified("e", "student_id"),
            )),
        )
        .join(
            TableRef::aliased("courses", "c"),
            Some(Expr::eq(
                Expr::qualified("e", "course"),
                Expr::qualified("c", "title"),
            )),
        )
        .columns(vec![
            SelectItem::expr(Expr::qualified("s", "name")),
            SelectItem::expr(Expr::qualified("c", "room")),
        ])
        .filter(Expr::eq(Expr::qualified("s", "name"), Expr::text("Alice")))
        .order_by(Expr::qualified("c", "room"), true);

    let result = engine.query(&stmt).unwrap();
    assert_eq!(
        result.rows,
        vec![
            Row::new().with("name", "Alice").with("room", 101),
            Row::new().with("name", "Alice").with("room", 202),
        ]
    );
}

#[test]
fn test_distinct_and_alias_ordering() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let stmt = SelectStatement::new("enrollments")
        .columns(vec![SelectItem::aliased(Expr::col("course"), "subject")])
        .order_by(Expr::col("subject"), true)
        .distinct();

    let result = engine.query(&stmt).unwrap();
    assert_eq!(
        column(&result.rows, "subject"),
        vec![
            Value::Text("Art".into()),
            Value::Text("History".into()),
            Value::Text("Math".into()),
        ]
    );
}

#[test]
fn test_like_and_or_predicates() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let stmt = SelectStatement::new("students")
        .columns(vec![SelectItem::expr(Expr::col("id"))])
        .filter(Expr::or(
            Expr::like(Expr::col("name"), "%o%"),
            Expr::eq(Expr::col("age"), Expr::int(20)),
        ));

    let result = engine.query(&stmt).unwrap();
    assert_eq!(
        column(&result.rows, "id"),
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn test_indexed_where_matches_scan() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);
    let stmt = SelectStatement::new("students")
        .filter(Expr::binary(Expr::col("age"), BinaryOperator::Gte, Expr::int(21)));

    let scanned = engine.query(&stmt).unwrap();
    engine
        .execute(Statement::CreateIndex(CreateIndexStatement {
            index_name: None,
            table_name: "students".to_string(),
            column: "age".to_string(),
        }))
        .unwrap();
    let indexed = engine.query(&stmt).unwrap();

    assert_eq!(scanned, indexed);
    assert_eq!(indexed.rows.len(), 2);
}

#[test]
fn test_rejected_query_shapes() {
    let mut engine = ExecutionEngine::in_memory();
    school(&mut engine, false);

    let mut negative = SelectStatement::new("students");
    negative.limit = Some(Expr::int(-1));
    assert!(matches!(engine.query(&negative), Err(Error::InvalidLimit(_))));

    let mut textual = SelectStatement::new("students");
    textual.limit = Some(Expr::text("ten"));
    assert!(matches!(engine.query(&textual), Err(Error::InvalidLimit(_))));

    let bare_column = SelectStatement::new("students").filter(Expr::col("age"));
    assert!(matches!(
        engine.query(&bare_column),
        Err(Error::UnsupportedPredicate(_))
    ));

    let missing = SelectStatement::new("teachers");
    assert!(matches!(engine.query(&missing), Err(Error::TableNotFound(_))));

    let self_join = SelectStatement::new("students").join("students", None);
    assert!(matches!(engine.query(&self_join), Err(Error::InvalidQuery(_))));
}
