//! Expression evaluation
//!
//! Predicates and scalar expressions are evaluated against an
//! [`EvalContext`], which resolves column references and aggregate calls.
//! A plain row resolves columns directly and rejects aggregates; a group
//! resolves columns from its first row and computes aggregates over all of
//! its rows.

use crate::error::{Error, Result};
use crate::sql::ast::{BinaryOperator, ColumnRef, Expr, FunctionArg, Literal};
use crate::storage::{Row, Value};

/// Resolves the leaves of an expression
pub trait EvalContext {
    /// Value of a column reference
    fn column(&self, column: &ColumnRef) -> Result<Value>;

    /// Value of an aggregate call
    fn function(&self, name: &str, arg: &FunctionArg) -> Result<Value>;
}

/// Find a column in a row.
///
/// Qualified references match `qualifier.column`; on a row of a single
/// source, which carries bare keys, they match the bare column name.
/// Unqualified references match the bare name, then the first key ending
/// in `.column`.
pub fn resolve_column<'r>(row: &'r Row, column: &ColumnRef) -> Option<&'r Value> {
    if let Some(table) = &column.table {
        let qualified = format!("{}.{}", table, column.column);
        if let Some(value) = row.get(&qualified) {
            return Some(value);
        }
        if is_prefixed(row) {
            return None;
        }
        return row.get(&column.column);
    }

    if let Some(value) = row.get(&column.column) {
        return Some(value);
    }
    let suffix = format!(".{}", column.column);
    row.iter()
        .find(|(key, _)| key.ends_with(&suffix))
        .map(|(_, value)| value)
}

/// Key of `column` in `row`, using the same rules as [`resolve_column`]
pub fn resolve_key(row: &Row, column: &ColumnRef) -> Option<String> {
    if let Some(table) = &column.table {
        let qualified = format!("{}.{}", table, column.column);
        if row.contains_key(&qualified) {
            return Some(qualified);
        }
        if is_prefixed(row) {
            return None;
        }
    } else {
        let suffix = format!(".{}", column.column);
        if !row.contains_key(&column.column) {
            return row
                .keys()
                .find(|key| key.ends_with(&suffix))
                .map(str::to_string);
        }
    }
    row.contains_key(&column.column)
        .then(|| column.column.clone())
}

/// Rows built from several sources are keyed `reference.column`
fn is_prefixed(row: &Row) -> bool {
    row.keys().any(|key| key.contains('.'))
}

fn column_not_found(column: &ColumnRef) -> Error {
    Error::ColumnNotFound(
        column.column.clone(),
        column.table.clone().unwrap_or_else(|| "query".to_string()),
    )
}

/// Context over a single row
pub struct RowContext<'a> {
    row: &'a Row,
}

impl<'a> RowContext<'a> {
    pub fn new(row: &'a Row) -> Self {
        Self { row }
    }
}

impl EvalContext for RowContext<'_> {
    fn column(&self, column: &ColumnRef) -> Result<Value> {
        resolve_column(self.row, column)
            .cloned()
            .ok_or_else(|| column_not_found(column))
    }

    fn function(&self, name: &str, arg: &FunctionArg) -> Result<Value> {
        Err(Error::UnsupportedExpression(format!(
            "aggregate {}({}) is only allowed in the select list or HAVING",
            name.to_uppercase(),
            arg
        )))
    }
}

/// Context over a group of rows sharing a grouping key
pub struct GroupContext<'a> {
    rows: &'a [Row],
}

impl<'a> GroupContext<'a> {
    pub fn new(rows: &'a [Row]) -> Self {
        Self { rows }
    }
}

impl EvalContext for GroupContext<'_> {
    fn column(&self, column: &ColumnRef) -> Result<Value> {
        match self.rows.first() {
            Some(row) => resolve_column(row, column)
                .cloned()
                .ok_or_else(|| column_not_found(column)),
            None => Ok(Value::Null),
        }
    }

    fn function(&self, name: &str, arg: &FunctionArg) -> Result<Value> {
        aggregate(name, arg, self.rows)
    }
}

/// Check that an aggregate call is one the engine computes: `COUNT(*)`,
/// or COUNT, SUM, MIN and MAX over a column
pub fn check_aggregate(name: &str, arg: &FunctionArg) -> Result<()> {
    let func = name.to_uppercase();
    match (func.as_str(), arg) {
        ("COUNT", _) | ("SUM" | "MIN" | "MAX", FunctionArg::Column(_)) => Ok(()),
        (_, FunctionArg::Star) => Err(Error::UnsupportedAggregate(format!("{}(*)", func))),
        _ => Err(Error::UnsupportedAggregate(func)),
    }
}

/// Run [`check_aggregate`] on every aggregate call in `expr`
pub fn check_aggregates(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Function { name, arg } => check_aggregate(name, arg),
        Expr::BinaryOp { left, right, .. } => {
            check_aggregates(left)?;
            check_aggregates(right)
        }
        Expr::Like { expr, pattern, .. } => {
            check_aggregates(expr)?;
            check_aggregates(pattern)
        }
        Expr::Nested(inner) => check_aggregates(inner),
        Expr::Column(_) | Expr::Literal(_) => Ok(()),
    }
}

/// Compute an aggregate over a set of rows
pub fn aggregate(name: &str, arg: &FunctionArg, rows: &[Row]) -> Result<Value> {
    check_aggregate(name, arg)?;
    let func = name.to_uppercase();
    let column = match arg {
        FunctionArg::Star => return Ok(Value::Integer(rows.len() as i64)),
        FunctionArg::Column(column) => column,
    };

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = resolve_column(row, column).ok_or_else(|| column_not_found(column))?;
        if !value.is_null() {
            values.push(value);
        }
    }

    match func.as_str() {
        "COUNT" => Ok(Value::Integer(values.len() as i64)),
        "SUM" => {
            let mut total: i64 = 0;
            for value in values {
                let n = value.as_i64().ok_or_else(|| Error::TypeMismatch {
                    column: column.to_string(),
                    expected: "INT".to_string(),
                    found: value.type_name().to_string(),
                })?;
                total = total
                    .checked_add(n)
                    .ok_or_else(|| Error::InvalidQuery(format!("SUM({}) overflows", column)))?;
            }
            Ok(Value::Integer(total))
        }
        "MIN" => Ok(values.into_iter().min().cloned().unwrap_or(Value::Null)),
        "MAX" => Ok(values.into_iter().max().cloned().unwrap_or(Value::Null)),
        other => Err(Error::UnsupportedAggregate(other.to_string())),
    }
}

/// Convert a literal into a value
pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(i) => Value::Integer(*i),
        Literal::String(s) => Value::Text(s.clone()),
    }
}

/// Evaluate a scalar expression
pub fn eval_scalar(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value> {
    match expr {
        Expr::Column(column) => ctx.column(column),
        Expr::Literal(literal) => Ok(literal_value(literal)),
        Expr::Function { name, arg } => ctx.function(name, arg),
        Expr::Nested(inner) => eval_scalar(inner, ctx),
        Expr::BinaryOp { .. } | Expr::Like { .. } => Err(Error::UnsupportedExpression(format!(
            "'{}' is not a scalar value",
            expr
        ))),
    }
}

/// Evaluate a predicate.
///
/// Comparisons between values of different types, or involving NULL,
/// are false; `!=` between different non-NULL types is true.
pub fn eval_predicate(expr: &Expr, ctx: &dyn EvalContext) -> Result<bool> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => Ok(eval_predicate(left, ctx)? && eval_predicate(right, ctx)?),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => Ok(eval_predicate(left, ctx)? || eval_predicate(right, ctx)?),
        Expr::BinaryOp { left, op, right } => {
            let l = eval_scalar(left, ctx)?;
            let r = eval_scalar(right, ctx)?;
            Ok(compare_values(&l, *op, &r))
        }
        Expr::Nested(inner) => eval_predicate(inner, ctx),
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let value = eval_scalar(expr, ctx)?;
            let pattern = eval_scalar(pattern, ctx)?;
            match (value.as_str(), pattern.as_str()) {
                (Some(text), Some(pattern)) => Ok(like_match(text, pattern) != *negated),
                _ => Ok(false),
            }
        }
        Expr::Column(_) | Expr::Literal(_) | Expr::Function { .. } => Err(
            Error::UnsupportedPredicate(format!("'{}' is not a boolean condition", expr)),
        ),
    }
}

/// Apply a comparison operator to two values
pub fn compare_values(left: &Value, op: BinaryOperator, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    let Some(ordering) = left.compare(right) else {
        return op == BinaryOperator::Neq;
    };
    match op {
        BinaryOperator::Eq => ordering.is_eq(),
        BinaryOperator::Neq => ordering.is_ne(),
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::Lte => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::Gte => ordering.is_ge(),
        BinaryOperator::And | BinaryOperator::Or => false,
    }
}

/// SQL LIKE matching: `%` matches any run of characters, `_` exactly one
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matches[j]: text[..i] matches pattern[..j]
    let mut matches = vec![false; pattern.len() + 1];
    matches[0] = true;
    for j in 1..=pattern.len() {
        matches[j] = matches[j - 1] && pattern[j - 1] == '%';
    }

    for c in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matches[j],
                '_' => matches[j - 1],
                p => matches[j - 1] && p == *c,
            };
        }
        matches = next;
    }
    matches[pattern.len()]
}
