//! SQL Abstract Syntax Tree (AST)
//!
//! This module defines the typed statement tree the engine executes. Text
//! parsing happens outside the engine (see [`super::SqlParser`]); a parser
//! hands the engine values of these types.

use std::fmt;

/// A SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT statement
    Select(SelectStatement),
    /// INSERT statement
    Insert(InsertStatement),
    /// UPDATE statement
    Update(UpdateStatement),
    /// DELETE statement
    Delete(DeleteStatement),
    /// CREATE TABLE statement
    CreateTable(CreateTableStatement),
    /// DROP TABLE statement
    DropTable(DropTableStatement),
    /// CREATE INDEX statement
    CreateIndex(CreateIndexStatement),
}

impl Statement {
    /// Short statement kind, used in log spans
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::CreateIndex(_) => "CREATE INDEX",
        }
    }

    /// Whether executing the statement can change stored state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Statement::Select(_))
    }
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// DISTINCT flag
    pub distinct: bool,
    /// Select list (columns or expressions)
    pub columns: Vec<SelectItem>,
    /// FROM clause
    pub from: FromClause,
    /// WHERE clause
    pub where_clause: Option<Expr>,
    /// GROUP BY clause
    pub group_by: Vec<Expr>,
    /// HAVING clause
    pub having: Option<Expr>,
    /// ORDER BY clause
    pub order_by: Vec<OrderByItem>,
    /// LIMIT clause
    pub limit: Option<Expr>,
}

impl SelectStatement {
    /// `SELECT * FROM table`
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            distinct: false,
            columns: vec![SelectItem::Wildcard],
            from: FromClause {
                table: table.into(),
                joins: Vec::new(),
            },
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Replace the select list
    pub fn columns(mut self, columns: Vec<SelectItem>) -> Self {
        self.columns = columns;
        self
    }

    /// Add a JOIN ... ON clause
    pub fn join(mut self, table: impl Into<TableRef>, condition: Option<Expr>) -> Self {
        self.from.joins.push(Join {
            table: table.into(),
            condition,
        });
        self
    }

    /// Set the WHERE clause
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.where_clause = Some(predicate);
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(predicate);
        self
    }

    /// Append an ORDER BY key
    pub fn order_by(mut self, expr: Expr, ascending: bool) -> Self {
        self.order_by.push(OrderByItem { expr, ascending });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(Expr::int(limit));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// A single item in the SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// All columns (*)
    Wildcard,
    /// A table's all columns (table.*)
    QualifiedWildcard(String),
    /// An expression with optional alias
    Expr { expr: Expr, alias: Option<String> },
}

impl SelectItem {
    /// Unaliased expression item
    pub fn expr(expr: Expr) -> Self {
        SelectItem::Expr { expr, alias: None }
    }

    /// Aliased expression item
    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        SelectItem::Expr {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// FROM clause
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    /// Base table
    pub table: TableRef,
    /// JOIN clauses
    pub joins: Vec<Join>,
}

/// Table reference
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Table name
    pub name: String,
    /// Optional alias
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name the table's columns are qualified with
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::new(name)
    }
}

/// JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Table to join
    pub table: TableRef,
    /// ON condition; `None` is a cross join
    pub condition: Option<Expr>,
}

/// ORDER BY item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Expression to order by
    pub expr: Expr,
    /// Ascending (true) or descending (false)
    pub ascending: bool,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Target table name
    pub table_name: String,
    /// Column names (optional)
    pub columns: Option<Vec<String>>,
    /// Values to insert
    pub values: Vec<Vec<Expr>>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Target table name
    pub table_name: String,
    /// SET clause (column = value pairs)
    pub assignments: Vec<Assignment>,
    /// WHERE clause
    pub where_clause: Option<Expr>,
}

/// Column assignment (for UPDATE)
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column name
    pub column: String,
    /// New value
    pub value: Expr,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Target table name
    pub table_name: String,
    /// WHERE clause
    pub where_clause: Option<Expr>,
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    /// Table name
    pub table_name: String,
    /// Column definitions
    pub columns: Vec<ColumnDef>,
    /// Table constraints
    pub constraints: Vec<TableConstraint>,
}

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type name as written; resolved by the executor
    pub data_type: String,
    /// Inline PRIMARY KEY constraint
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Table-level constraint
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    /// PRIMARY KEY constraint
    PrimaryKey { columns: Vec<String> },
    /// FOREIGN KEY constraint
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        /// ON DELETE CASCADE
        cascade: bool,
    },
}

/// DROP TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    /// Table name
    pub table_name: String,
    /// IF EXISTS flag
    pub if_exists: bool,
    /// CASCADE flag
    pub cascade: bool,
}

/// CREATE INDEX statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStatement {
    /// Index name, informational only; indexes are keyed by column
    pub index_name: Option<String>,
    /// Table name
    pub table_name: String,
    /// Indexed column
    pub column: String,
}

/// SQL Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(ColumnRef),
    /// Literal value
    Literal(Literal),
    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Aggregate function call
    Function { name: String, arg: FunctionArg },
    /// LIKE
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// Nested expression (in parentheses)
    Nested(Box<Expr>),
}

impl Expr {
    /// Unqualified column reference
    pub fn col(column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef {
            table: None,
            column: column.into(),
        })
    }

    /// Qualified column reference (`table.column`)
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef {
            table: Some(table.into()),
            column: column.into(),
        })
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOperator::Eq, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOperator::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOperator::Or, right)
    }

    pub fn nested(expr: Expr) -> Self {
        Expr::Nested(Box::new(expr))
    }

    pub fn like(expr: Expr, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(expr),
            pattern: Box::new(Expr::text(pattern)),
            negated: false,
        }
    }

    /// `COUNT(*)`
    pub fn count_star() -> Self {
        Expr::Function {
            name: "COUNT".to_string(),
            arg: FunctionArg::Star,
        }
    }

    /// Aggregate over a column, e.g. `SUM(age)`
    pub fn aggregate(name: impl Into<String>, column: ColumnRef) -> Self {
        Expr::Function {
            name: name.into(),
            arg: FunctionArg::Column(column),
        }
    }

    /// Whether the expression contains an aggregate call
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function { .. } => true,
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_aggregate() || pattern.contains_aggregate()
            }
            Expr::Nested(inner) => inner.contains_aggregate(),
            Expr::Column(_) | Expr::Literal(_) => false,
        }
    }

    /// Collect every column the expression refers to, aggregate arguments
    /// included
    pub fn column_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(column)
            | Expr::Function {
                arg: FunctionArg::Column(column),
                ..
            } => out.push(column),
            Expr::BinaryOp { left, right, .. } => {
                left.column_refs(out);
                right.column_refs(out);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.column_refs(out);
                pattern.column_refs(out);
            }
            Expr::Nested(inner) => inner.column_refs(out),
            Expr::Function { .. } | Expr::Literal(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(Literal::Integer(i)) => write!(f, "{}", i),
            Expr::Literal(Literal::String(s)) => write!(f, "'{}'", s),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Function { name, arg } => write!(f, "{}({})", name.to_uppercase(), arg),
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}LIKE {}", expr, not, pattern)
            }
            Expr::Nested(inner) => write!(f, "({})", inner),
        }
    }
}

/// Argument of an aggregate call
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// `*`
    Star,
    /// A column
    Column(ColumnRef),
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionArg::Star => write!(f, "*"),
            FunctionArg::Column(c) => write!(f, "{}", c),
        }
    }
}

/// Column reference
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Table name or alias (optional)
    pub table: Option<String>,
    /// Column name
    pub column: String,
}

impl From<String> for ColumnRef {
    fn from(column: String) -> Self {
        Self {
            table: None,
            column,
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(column: &str) -> Self {
        column.to_string().into()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer
    Integer(i64),
    /// String
    String(String),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// Whether this is a comparison (as opposed to AND/OR)
    pub fn is_comparison(&self) -> bool {
        !matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// The operator with its operands swapped (`a < b` == `b > a`)
    pub fn flipped(&self) -> Self {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::Lte => BinaryOperator::Gte,
            BinaryOperator::Gte => BinaryOperator::Lte,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        };
        write!(f, "{}", s)
    }
}
