//! SELECT pipeline
//!
//! Stages run in a fixed order: sources, join, merge, WHERE, ORDER BY,
//! GROUP BY with aggregation and HAVING (or plain projection), DISTINCT,
//! LIMIT. Rows of a single source keep bare column names; rows built from
//! several sources are keyed `reference.column`.

use indexmap::IndexMap;
use std::collections::HashSet;

use super::eval::{
    check_aggregates, eval_predicate, eval_scalar, resolve_key, GroupContext, RowContext,
};
use super::optimizer::{HeuristicOptimizer, JoinStrategy};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::sql::ast::{ColumnRef, Expr, Literal, SelectItem, SelectStatement};
use crate::storage::{Row, RowId, Table, Value};

/// One FROM/JOIN table with the rows it contributes
struct Source<'a> {
    table: &'a Table,
    /// Alias, or the table name
    reference: String,
    /// Rows as seen by the query, prefixed when there are several sources
    rows: Vec<Row>,
}

/// A merged row with the per-source row positions it came from
struct Candidate {
    positions: Vec<usize>,
    row: Row,
}

/// Run a SELECT against the catalog
pub fn execute_select(
    catalog: &Catalog,
    optimizer: &HeuristicOptimizer,
    stmt: &SelectStatement,
) -> Result<Vec<Row>> {
    let sources = resolve_sources(catalog, stmt)?;
    if let [only] = sources.as_slice() {
        check_qualifiers(stmt, &only.reference)?;
    }
    let combos = join_sources(optimizer, stmt, &sources)?;
    let candidates = merge_combos(&sources, combos);
    let candidates = apply_where(optimizer, stmt, &sources, candidates)?;

    let mut rows: Vec<Row> = candidates.into_iter().map(|c| c.row).collect();
    apply_order_by(stmt, &mut rows)?;

    let rows = if is_aggregate_query(stmt) {
        group_and_aggregate(stmt, rows)?
    } else {
        project(stmt, &rows)?
    };

    let rows = if stmt.distinct { distinct(rows) } else { rows };
    apply_limit(stmt, rows)
}

fn resolve_sources<'a>(catalog: &'a Catalog, stmt: &SelectStatement) -> Result<Vec<Source<'a>>> {
    let refs = std::iter::once(&stmt.from.table).chain(stmt.from.joins.iter().map(|j| &j.table));
    let multi = !stmt.from.joins.is_empty();

    let mut sources: Vec<Source<'a>> = Vec::new();
    for table_ref in refs {
        let reference = table_ref.reference_name().to_string();
        if sources.iter().any(|s| s.reference == reference) {
            return Err(Error::InvalidQuery(format!(
                "table reference '{}' appears more than once; use an alias",
                reference
            )));
        }

        let table = catalog.get_table(&table_ref.name)?;
        let rows = table
            .scan()
            .map(|(_, row)| {
                if multi {
                    prefixed(row, &reference)
                } else {
                    row.clone()
                }
            })
            .collect();
        sources.push(Source {
            table,
            reference,
            rows,
        });
    }
    Ok(sources)
}

/// Rows of a single source carry bare keys, so a qualifier naming another
/// table would otherwise resolve against them
fn check_qualifiers(stmt: &SelectStatement, reference: &str) -> Result<()> {
    let mut refs = Vec::new();
    for item in &stmt.columns {
        match item {
            SelectItem::Expr { expr, .. } => expr.column_refs(&mut refs),
            SelectItem::QualifiedWildcard(qualifier) if qualifier != reference => {
                return Err(Error::TableNotFound(qualifier.clone()));
            }
            SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {}
        }
    }
    let clauses = stmt
        .where_clause
        .iter()
        .chain(&stmt.group_by)
        .chain(&stmt.having)
        .chain(stmt.order_by.iter().map(|item| &item.expr));
    for expr in clauses {
        expr.column_refs(&mut refs);
    }

    match refs
        .into_iter()
        .find(|c| c.table.as_deref().is_some_and(|t| t != reference))
    {
        Some(column) => Err(Error::ColumnNotFound(
            column.column.clone(),
            column.table.clone().unwrap_or_default(),
        )),
        None => Ok(()),
    }
}

fn prefixed(row: &Row, reference: &str) -> Row {
    row.iter()
        .map(|(k, v)| (format!("{}.{}", reference, k), v.clone()))
        .collect()
}

fn merged(parts: &[&Row]) -> Row {
    parts
        .iter()
        .flat_map(|r| r.iter())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Row-position tuples surviving the join
fn join_sources(
    optimizer: &HeuristicOptimizer,
    stmt: &SelectStatement,
    sources: &[Source<'_>],
) -> Result<Vec<Vec<usize>>> {
    match sources {
        [only] => Ok((0..only.rows.len()).map(|i| vec![i]).collect()),
        [left, right] => {
            let Some(condition) = stmt.from.joins[0].condition.as_ref() else {
                return Ok(cartesian(sources));
            };

            let strategy = optimizer.choose_join_strategy(&left.rows, &right.rows, Some(condition));
            tracing::debug!(
                ?strategy,
                left = left.rows.len(),
                right = right.rows.len(),
                "joining two tables"
            );

            let pairs = match strategy {
                JoinStrategy::SortMerge => {
                    let (a, b) = optimizer.extract_join_keys(condition)?;
                    let (left_key, right_key) = orient_keys(a, b, left, right);
                    optimizer.sort_merge_join(&left.rows, &right.rows, &left_key, &right_key)
                }
                JoinStrategy::NestedLoop => {
                    optimizer.nested_loop_join(&left.rows, &right.rows, |l, r| {
                        let row = merged(&[l, r]);
                        eval_predicate(condition, &RowContext::new(&row))
                    })?
                }
            };
            Ok(pairs.into_iter().map(|(l, r)| vec![l, r]).collect())
        }
        _ => {
            // Three or more tables: full product, then every ON condition
            // as a filter
            tracing::debug!(tables = sources.len(), "joining by cartesian product");
            let conditions: Vec<&Expr> = stmt
                .from
                .joins
                .iter()
                .filter_map(|j| j.condition.as_ref())
                .collect();

            let mut combos = Vec::new();
            for combo in cartesian(sources) {
                let parts: Vec<&Row> = combo
                    .iter()
                    .zip(sources)
                    .map(|(i, s)| &s.rows[*i])
                    .collect();
                let row = merged(&parts);
                let ctx = RowContext::new(&row);
                let mut keep = true;
                for condition in &conditions {
                    if !eval_predicate(condition, &ctx)? {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    combos.push(combo);
                }
            }
            Ok(combos)
        }
    }
}

fn cartesian(sources: &[Source<'_>]) -> Vec<Vec<usize>> {
    sources.iter().fold(vec![Vec::new()], |acc, source| {
        acc.into_iter()
            .flat_map(|prefix| {
                (0..source.rows.len()).map(move |i| {
                    let mut combo = prefix.clone();
                    combo.push(i);
                    combo
                })
            })
            .collect()
    })
}

/// Put the join key belonging to the left source first
fn orient_keys(
    a: ColumnRef,
    b: ColumnRef,
    left: &Source<'_>,
    right: &Source<'_>,
) -> (ColumnRef, ColumnRef) {
    let belongs = |key: &ColumnRef, source: &Source<'_>| match &key.table {
        Some(q) => *q == source.reference,
        None => source.table.definition().has_column(&key.column),
    };
    if belongs(&a, left) && belongs(&b, right) {
        (a, b)
    } else if belongs(&b, left) && belongs(&a, right) {
        (b, a)
    } else {
        (a, b)
    }
}

fn merge_combos(sources: &[Source<'_>], combos: Vec<Vec<usize>>) -> Vec<Candidate> {
    combos
        .into_iter()
        .map(|positions| {
            let parts: Vec<&Row> = positions
                .iter()
                .zip(sources)
                .map(|(i, s)| &s.rows[*i])
                .collect();
            let row = merged(&parts);
            Candidate { positions, row }
        })
        .collect()
}

fn apply_where(
    optimizer: &HeuristicOptimizer,
    stmt: &SelectStatement,
    sources: &[Source<'_>],
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>> {
    let Some(predicate) = &stmt.where_clause else {
        return Ok(candidates);
    };

    let first = &sources[0];
    if let Some(ids) = index_filter(optimizer, first.table, &first.reference, sources.len() == 1, predicate)
    {
        let ids: HashSet<RowId> = ids.into_iter().collect();
        return Ok(candidates
            .into_iter()
            .filter(|c| ids.contains(&RowId(c.positions[0])))
            .collect());
    }

    let predicate = optimizer.reorder_conditions(predicate);
    tracing::debug!(predicate = %predicate, "evaluating WHERE by scan");
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if eval_predicate(&predicate, &RowContext::new(&candidate.row))? {
            kept.push(candidate);
        }
    }
    Ok(kept)
}

/// Row ids of `table` satisfying `predicate` through an index, when the
/// predicate allows it
pub(crate) fn index_filter(
    optimizer: &HeuristicOptimizer,
    table: &Table,
    reference: &str,
    single_source: bool,
    predicate: &Expr,
) -> Option<Vec<RowId>> {
    let probe = optimizer.index_probe(table, reference, single_source, predicate)?;
    let ids = table.index_lookup(&probe.column, probe.op, &probe.value)?;
    tracing::debug!(
        table = %table.name(),
        column = %probe.column,
        op = ?probe.op,
        matches = ids.len(),
        "index-accelerated WHERE"
    );
    Some(ids)
}

/// Row ids of a single table matching an optional WHERE clause, in row
/// order
pub(crate) fn matching_row_ids(
    optimizer: &HeuristicOptimizer,
    table: &Table,
    predicate: Option<&Expr>,
) -> Result<Vec<RowId>> {
    let Some(predicate) = predicate else {
        return Ok(table.scan().map(|(id, _)| id).collect());
    };

    if let Some(mut ids) = index_filter(optimizer, table, table.name(), true, predicate) {
        ids.sort();
        return Ok(ids);
    }

    let predicate = optimizer.reorder_conditions(predicate);
    let mut ids = Vec::new();
    for (id, row) in table.scan() {
        if eval_predicate(&predicate, &RowContext::new(row))? {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Stable multi-key sort; keys are applied last to first so the first key
/// dominates
fn apply_order_by(stmt: &SelectStatement, rows: &mut Vec<Row>) -> Result<()> {
    for item in stmt.order_by.iter().rev() {
        let expr = substitute_alias(stmt, &item.expr);
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows.drain(..) {
            let key = eval_scalar(expr, &RowContext::new(&row))?;
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.cmp(b);
            if item.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        rows.extend(keyed.into_iter().map(|(_, row)| row));
    }
    Ok(())
}

/// An unqualified name matching a select-list alias stands for the aliased
/// expression
fn substitute_alias<'e>(stmt: &'e SelectStatement, expr: &'e Expr) -> &'e Expr {
    let Expr::Column(ColumnRef { table: None, column }) = expr else {
        return expr;
    };
    stmt.columns
        .iter()
        .find_map(|item| match item {
            SelectItem::Expr {
                expr: aliased,
                alias: Some(alias),
            } if alias == column => Some(aliased),
            _ => None,
        })
        .unwrap_or(expr)
}

fn is_aggregate_query(stmt: &SelectStatement) -> bool {
    !stmt.group_by.is_empty()
        || stmt.having.is_some()
        || stmt.columns.iter().any(|item| match item {
            SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
            _ => false,
        })
}

/// Output column name of a select-list expression
fn output_name(expr: &Expr, alias: Option<&String>) -> String {
    match (alias, expr) {
        (Some(alias), _) => alias.clone(),
        (None, Expr::Column(c)) => c.column.clone(),
        (None, other) => other.to_string(),
    }
}

fn group_and_aggregate(stmt: &SelectStatement, rows: Vec<Row>) -> Result<Vec<Row>> {
    // Checked up front: no group may be left to evaluate them
    for item in &stmt.columns {
        if let SelectItem::Expr { expr, .. } = item {
            check_aggregates(expr)?;
        }
    }
    if let Some(having) = &stmt.having {
        check_aggregates(having)?;
    }

    let mut groups: IndexMap<Vec<Value>, Vec<Row>> = IndexMap::new();
    if stmt.group_by.is_empty() {
        groups.insert(Vec::new(), rows);
    } else {
        for row in rows {
            let ctx = RowContext::new(&row);
            let key = stmt
                .group_by
                .iter()
                .map(|expr| eval_scalar(expr, &ctx))
                .collect::<Result<Vec<Value>>>()?;
            groups.entry(key).or_default().push(row);
        }
    }

    let mut results = Vec::with_capacity(groups.len());
    for (_, group) in groups {
        let ctx = GroupContext::new(&group);
        if let Some(having) = &stmt.having {
            if !eval_predicate(having, &ctx)? {
                continue;
            }
        }

        let mut out = Row::new();
        for item in &stmt.columns {
            let SelectItem::Expr { expr, alias } = item else {
                return Err(Error::UnsupportedExpression(
                    "'*' cannot be combined with grouping or aggregates".to_string(),
                ));
            };
            out.insert(output_name(expr, alias.as_ref()), eval_scalar(expr, &ctx)?);
        }
        results.push(out);
    }
    Ok(results)
}

fn project(stmt: &SelectStatement, rows: &[Row]) -> Result<Vec<Row>> {
    rows.iter()
        .map(|row| {
            let ctx = RowContext::new(row);
            let mut out = Row::new();
            for item in &stmt.columns {
                match item {
                    SelectItem::Wildcard => {
                        for (k, v) in row.iter() {
                            out.insert(k, v.clone());
                        }
                    }
                    SelectItem::QualifiedWildcard(qualifier) => {
                        project_qualified_wildcard(row, qualifier, &mut out)?;
                    }
                    SelectItem::Expr { expr, alias } => {
                        let value = eval_scalar(expr, &ctx)?;
                        let mut name = output_name(expr, alias.as_ref());
                        if alias.is_none() && out.contains_key(&name) {
                            if let Expr::Column(c) = expr {
                                name = resolve_key(row, c).unwrap_or(name);
                            }
                        }
                        out.insert(name, value);
                    }
                }
            }
            Ok(out)
        })
        .collect()
}

fn project_qualified_wildcard(row: &Row, qualifier: &str, out: &mut Row) -> Result<()> {
    let prefix = format!("{}.", qualifier);
    let mut found = false;
    for (k, v) in row.iter() {
        if let Some(bare) = k.strip_prefix(&prefix) {
            let name = if out.contains_key(bare) { k } else { bare };
            out.insert(name, v.clone());
            found = true;
        }
    }
    if found {
        return Ok(());
    }
    // A single source carries bare keys
    if row.keys().all(|k| !k.contains('.')) {
        for (k, v) in row.iter() {
            out.insert(k, v.clone());
        }
        return Ok(());
    }
    Err(Error::TableNotFound(qualifier.to_string()))
}

/// Drop rows whose full field-value tuple was already seen
fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<(String, Value)> =
                row.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            seen.insert(key)
        })
        .collect()
}

fn apply_limit(stmt: &SelectStatement, mut rows: Vec<Row>) -> Result<Vec<Row>> {
    let Some(limit) = &stmt.limit else {
        return Ok(rows);
    };
    match limit {
        Expr::Literal(Literal::Integer(n)) if *n >= 0 => {
            let n = usize::try_from(*n).unwrap_or(usize::MAX);
            rows.truncate(n);
            Ok(rows)
        }
        other => Err(Error::InvalidLimit(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{catalog::TableBuilder, DataType};
    use crate::sql::ast::{BinaryOperator, FunctionArg, TableRef};

    fn school() -> Catalog {
        let mut catalog = Catalog::new("test");
        TableBuilder::new("students")
            .primary_key("id", DataType::Int)
            .column("name", DataType::Text)
            .column("age", DataType::Int)
            .build(&mut catalog)
            .unwrap();
        TableBuilder::new("enrollments")
            .primary_key("enrollment_id", DataType::Int)
            .column("student_id", DataType::Int)
            .column("course", DataType::Text)
            .build(&mut catalog)
            .unwrap();

        let students = catalog.get_table_mut("students").unwrap();
        for (id, name, age) in [(1, "Alice", 20), (2, "Bob", 21), (3, "Carol", 21)] {
            students
                .insert(Row::new().with("id", id).with("name", name).with("age", age))
                .unwrap();
        }
        let enrollments = catalog.get_table_mut("enrollments").unwrap();
        for (id, student, course) in [(10, 1, "Math"), (11, 2, "Math"), (12, 1, "Art")] {
            enrollments
                .insert(
                    Row::new()
                        .with("enrollment_id", id)
                        .with("student_id", student)
                        .with("course", course),
                )
                .unwrap();
        }
        catalog
    }

    fn run(catalog: &Catalog, stmt: SelectStatement) -> Result<Vec<Row>> {
        execute_select(catalog, &HeuristicOptimizer::default(), &stmt)
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_where_and_projection() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .columns(vec![SelectItem::expr(Expr::col("name"))])
            .filter(Expr::binary(Expr::col("age"), BinaryOperator::Gt, Expr::int(20)));

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(rows, vec![Row::new().with("name", "Bob"), Row::new().with("name", "Carol")]);
    }

    #[test]
    fn test_index_where_keeps_row_order() {
        let mut catalog = school();
        catalog.get_table_mut("students").unwrap().create_index("age").unwrap();
        let stmt = SelectStatement::new("students")
            .filter(Expr::binary(Expr::int(20), BinaryOperator::Lt, Expr::col("age")));

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(names(&rows), vec!["Bob", "Carol"]);
    }

    #[test]
    fn test_join_with_aliases() {
        let catalog = school();
        let stmt = SelectStatement::new(TableRef::aliased("students", "s"))
            .join(
                TableRef::aliased("enrollments", "e"),
                Some(Expr::eq(Expr::qualified("s", "id"), Expr::qualified("e", "student_id"))),
            )
            .columns(vec![
                SelectItem::expr(Expr::qualified("s", "name")),
                SelectItem::expr(Expr::qualified("e", "course")),
            ])
            .order_by(Expr::col("course"), true)
            .order_by(Expr::col("name"), true);

        let rows = run(&catalog, stmt).unwrap();
        let pairs: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.get("name").unwrap().to_string(), r.get("course").unwrap().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Alice".to_string(), "Art".to_string()),
                ("Alice".to_string(), "Math".to_string()),
                ("Bob".to_string(), "Math".to_string()),
            ]
        );
    }

    #[test]
    fn test_sort_merge_join_path_matches_nested_loop() {
        let catalog = school();
        let stmt = SelectStatement::new(TableRef::aliased("students", "s"))
            .join(
                TableRef::aliased("enrollments", "e"),
                Some(Expr::eq(Expr::qualified("e", "student_id"), Expr::qualified("s", "id"))),
            )
            .order_by(Expr::col("enrollment_id"), true);

        let nested = execute_select(&catalog, &HeuristicOptimizer::default(), &stmt).unwrap();
        let merged = execute_select(&catalog, &HeuristicOptimizer::new(0), &stmt).unwrap();
        assert_eq!(nested, merged);
        assert_eq!(nested.len(), 3);
        assert!(nested[0].contains_key("s.name"));
    }

    #[test]
    fn test_cross_join_without_condition() {
        let catalog = school();
        let stmt = SelectStatement::new("students").join("enrollments", None);
        assert_eq!(run(&catalog, stmt).unwrap().len(), 9);
    }

    #[test]
    fn test_order_by_multiple_keys() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .order_by(Expr::col("age"), false)
            .order_by(Expr::col("name"), true);

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(names(&rows), vec!["Bob", "Carol", "Alice"]);
    }

    #[test]
    fn test_group_by_having() {
        let catalog = school();
        let stmt = SelectStatement::new("enrollments")
            .columns(vec![
                SelectItem::expr(Expr::col("course")),
                SelectItem::expr(Expr::count_star()),
            ])
            .group_by(vec![Expr::col("course")])
            .having(Expr::binary(Expr::count_star(), BinaryOperator::Gt, Expr::int(1)));

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(
            rows,
            vec![Row::new().with("course", "Math").with("COUNT(*)", 2)]
        );
    }

    #[test]
    fn test_aggregate_without_group_by() {
        let catalog = school();
        let stmt = SelectStatement::new("students").columns(vec![
            SelectItem::aliased(Expr::aggregate("SUM", "age".into()), "total"),
            SelectItem::expr(Expr::aggregate("MAX", "name".into())),
        ]);

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(
            rows,
            vec![Row::new().with("total", 62).with("MAX(name)", "Carol")]
        );
    }

    #[test]
    fn test_unsupported_aggregate() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .columns(vec![SelectItem::expr(Expr::aggregate("AVG", "age".into()))]);
        assert!(matches!(
            run(&catalog, stmt),
            Err(Error::UnsupportedAggregate(_))
        ));
    }

    #[test]
    fn test_unsupported_aggregate_without_groups() {
        let mut catalog = Catalog::new("test");
        TableBuilder::new("students")
            .primary_key("id", DataType::Int)
            .column("name", DataType::Text)
            .column("age", DataType::Int)
            .build(&mut catalog)
            .unwrap();

        let avg = SelectStatement::new("students")
            .columns(vec![
                SelectItem::expr(Expr::col("name")),
                SelectItem::expr(Expr::aggregate("AVG", "age".into())),
            ])
            .group_by(vec![Expr::col("name")]);
        assert!(matches!(
            run(&catalog, avg),
            Err(Error::UnsupportedAggregate(ref name)) if name == "AVG"
        ));

        let sum_star = SelectStatement::new("students").columns(vec![SelectItem::expr(
            Expr::Function {
                name: "SUM".to_string(),
                arg: FunctionArg::Star,
            },
        )]);
        assert!(matches!(
            run(&catalog, sum_star),
            Err(Error::UnsupportedAggregate(ref name)) if name == "SUM(*)"
        ));
    }

    #[test]
    fn test_unsupported_aggregate_when_having_rejects_all() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .columns(vec![
                SelectItem::expr(Expr::col("age")),
                SelectItem::expr(Expr::aggregate("AVG", "age".into())),
            ])
            .group_by(vec![Expr::col("age")])
            .having(Expr::binary(Expr::count_star(), BinaryOperator::Gt, Expr::int(5)));
        assert!(matches!(
            run(&catalog, stmt),
            Err(Error::UnsupportedAggregate(_))
        ));
    }

    #[test]
    fn test_unknown_qualifier_on_single_table() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .columns(vec![SelectItem::expr(Expr::qualified("x", "age"))]);
        assert!(matches!(
            run(&catalog, stmt),
            Err(Error::ColumnNotFound(ref column, ref table)) if column == "age" && table == "x"
        ));

        let filtered = SelectStatement::new(TableRef::aliased("students", "s"))
            .filter(Expr::eq(Expr::qualified("students", "id"), Expr::int(1)));
        assert!(matches!(run(&catalog, filtered), Err(Error::ColumnNotFound(..))));

        let wildcard = SelectStatement::new("students")
            .columns(vec![SelectItem::QualifiedWildcard("x".to_string())]);
        assert!(matches!(run(&catalog, wildcard), Err(Error::TableNotFound(_))));

        let own = SelectStatement::new(TableRef::aliased("students", "s"))
            .columns(vec![SelectItem::expr(Expr::qualified("s", "name"))])
            .filter(Expr::eq(Expr::qualified("s", "id"), Expr::int(2)));
        assert_eq!(run(&catalog, own).unwrap(), vec![Row::new().with("name", "Bob")]);
    }

    #[test]
    fn test_distinct_and_limit() {
        let catalog = school();
        let stmt = SelectStatement::new("students")
            .columns(vec![SelectItem::expr(Expr::col("age"))])
            .distinct()
            .order_by(Expr::col("age"), true);
        let rows = run(&catalog, stmt.clone()).unwrap();
        assert_eq!(rows.len(), 2);

        let limited = run(&catalog, stmt.limit(1)).unwrap();
        assert_eq!(limited, vec![Row::new().with("age", 20)]);
    }

    #[test]
    fn test_invalid_limit() {
        let catalog = school();
        let mut stmt = SelectStatement::new("students");
        stmt.limit = Some(Expr::text("ten"));
        assert!(matches!(run(&catalog, stmt.clone()), Err(Error::InvalidLimit(_))));

        stmt.limit = Some(Expr::int(-1));
        assert!(matches!(run(&catalog, stmt), Err(Error::InvalidLimit(_))));
    }

    #[test]
    fn test_projection_name_collision_uses_qualified_key() {
        let catalog = school();
        let stmt = SelectStatement::new(TableRef::aliased("students", "s"))
            .join(
                TableRef::aliased("enrollments", "e"),
                Some(Expr::eq(Expr::qualified("s", "id"), Expr::qualified("e", "student_id"))),
            )
            .columns(vec![
                SelectItem::expr(Expr::qualified("s", "id")),
                SelectItem::expr(Expr::qualified("e", "enrollment_id")),
                SelectItem::aliased(Expr::qualified("e", "student_id"), "sid"),
            ])
            .filter(Expr::eq(Expr::qualified("e", "course"), Expr::text("Art")));

        let rows = run(&catalog, stmt).unwrap();
        assert_eq!(
            rows,
            vec![Row::new().with("id", 1).with("enrollment_id", 12).with("sid", 1)]
        );
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let catalog = school();
        let stmt = SelectStatement::new("students").join("students", None);
        assert!(matches!(run(&catalog, stmt), Err(Error::InvalidQuery(_))));
    }
}
