//! Heuristic query optimizer
//!
//! Size- and shape-based decisions only: which join algorithm to run,
//! whether a WHERE clause can be answered from an index, and in which
//! order the operands of an AND/OR chain are evaluated. There are no
//! statistics and no cost model beyond the fixed per-predicate costs below.

use std::cmp::Reverse;

use super::eval::{literal_value, resolve_column};
use crate::config::DEFAULT_SORT_MERGE_THRESHOLD;
use crate::error::{Error, Result};
use crate::sql::ast::{BinaryOperator, ColumnRef, Expr};
use crate::storage::{IndexProbeOp, Row, Table, Value};

/// Join algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    NestedLoop,
    SortMerge,
}

/// Index access derived from a WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct IndexProbe {
    /// Indexed column of the first source table
    pub column: String,
    pub op: IndexProbeOp,
    pub value: Value,
}

/// Heuristic-based query optimizer
#[derive(Debug, Clone)]
pub struct HeuristicOptimizer {
    /// Both inputs must exceed this many rows for a sort-merge join
    sort_merge_threshold: usize,
}

impl Default for HeuristicOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_SORT_MERGE_THRESHOLD)
    }
}

impl HeuristicOptimizer {
    /// Create a new optimizer
    pub fn new(sort_merge_threshold: usize) -> Self {
        Self {
            sort_merge_threshold,
        }
    }

    /// Sort-merge only for a column equality between two large inputs
    pub fn choose_join_strategy(
        &self,
        left: &[Row],
        right: &[Row],
        condition: Option<&Expr>,
    ) -> JoinStrategy {
        let is_equi_join = condition.map_or(false, |c| self.extract_join_keys(c).is_ok());
        if is_equi_join
            && left.len() > self.sort_merge_threshold
            && right.len() > self.sort_merge_threshold
        {
            JoinStrategy::SortMerge
        } else {
            JoinStrategy::NestedLoop
        }
    }

    /// The two column references of an equality join condition
    pub fn extract_join_keys(&self, condition: &Expr) -> Result<(ColumnRef, ColumnRef)> {
        match strip_nesting(condition) {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => match (strip_nesting(left), strip_nesting(right)) {
                (Expr::Column(l), Expr::Column(r)) => Ok((l.clone(), r.clone())),
                _ => Err(Error::UnsupportedPredicate(format!(
                    "join condition '{}' must compare two columns",
                    condition
                ))),
            },
            _ => Err(Error::UnsupportedPredicate(format!(
                "join condition '{}' is not an equality",
                condition
            ))),
        }
    }

    /// Equi-join by sorting both inputs on their key and merging.
    ///
    /// Returns `(left index, right index)` pairs. Rows whose key is missing
    /// or NULL never match.
    pub fn sort_merge_join(
        &self,
        left: &[Row],
        right: &[Row],
        left_key: &ColumnRef,
        right_key: &ColumnRef,
    ) -> Vec<(usize, usize)> {
        let keyed = |rows: &[Row], key: &ColumnRef| {
            let mut keyed: Vec<(Value, usize)> = rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| {
                    resolve_column(row, key)
                        .filter(|v| !v.is_null())
                        .map(|v| (v.clone(), i))
                })
                .collect();
            keyed.sort();
            keyed
        };
        let left_sorted = keyed(left, left_key);
        let right_sorted = keyed(right, right_key);

        let mut pairs = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < left_sorted.len() && j < right_sorted.len() {
            let lv = &left_sorted[i].0;
            let rv = &right_sorted[j].0;
            if lv < rv {
                i += 1;
            } else if lv > rv {
                j += 1;
            } else {
                // Emit the sub-product of both runs sharing this key
                let left_end = i + left_sorted[i..].iter().take_while(|(v, _)| v == lv).count();
                let right_end = j + right_sorted[j..].iter().take_while(|(v, _)| v == rv).count();
                for (_, l) in &left_sorted[i..left_end] {
                    for (_, r) in &right_sorted[j..right_end] {
                        pairs.push((*l, *r));
                    }
                }
                i = left_end;
                j = right_end;
            }
        }
        pairs
    }

    /// Pairwise join; `matches` decides each pair
    pub fn nested_loop_join<F>(
        &self,
        left: &[Row],
        right: &[Row],
        mut matches: F,
    ) -> Result<Vec<(usize, usize)>>
    where
        F: FnMut(&Row, &Row) -> Result<bool>,
    {
        let mut pairs = Vec::new();
        for (i, l) in left.iter().enumerate() {
            for (j, r) in right.iter().enumerate() {
                if matches(l, r)? {
                    pairs.push((i, j));
                }
            }
        }
        Ok(pairs)
    }

    /// Reorder an AND or OR chain by estimated cost: cheapest first for
    /// AND, most expensive first for OR. The result is left-associative
    /// and evaluates to the same truth value.
    pub fn reorder_conditions(&self, predicate: &Expr) -> Expr {
        let op = match predicate {
            Expr::BinaryOp { op, .. } if !op.is_comparison() => *op,
            _ => return predicate.clone(),
        };

        let mut conditions = Vec::new();
        flatten_chain(predicate, op, &mut conditions);
        let mut conditions: Vec<Expr> = conditions
            .into_iter()
            .map(|c| match c {
                Expr::Nested(inner) => Expr::Nested(Box::new(self.reorder_conditions(inner))),
                other => other.clone(),
            })
            .collect();

        if op == BinaryOperator::And {
            conditions.sort_by_key(estimate_cost);
        } else {
            conditions.sort_by_key(|c| Reverse(estimate_cost(c)));
        }

        let mut iter = conditions.into_iter();
        match iter.next() {
            Some(first) => iter.fold(first, |acc, c| Expr::binary(acc, op, c)),
            None => predicate.clone(),
        }
    }

    /// Index access for a WHERE clause consisting of a single comparison
    /// between an indexed column of the first source and a literal of the
    /// column's type. `reference_name` is the first source's alias or name;
    /// with several sources an explicit qualifier must match it.
    pub fn index_probe(
        &self,
        table: &Table,
        reference_name: &str,
        single_source: bool,
        predicate: &Expr,
    ) -> Option<IndexProbe> {
        let Expr::BinaryOp { left, op, right } = strip_nesting(predicate) else {
            return None;
        };
        let (column, literal, op) = match (strip_nesting(left), strip_nesting(right)) {
            (Expr::Column(c), Expr::Literal(l)) => (c, l, *op),
            (Expr::Literal(l), Expr::Column(c)) => (c, l, op.flipped()),
            _ => return None,
        };

        let probe_op = match op {
            BinaryOperator::Eq => IndexProbeOp::Eq,
            BinaryOperator::Lt => IndexProbeOp::Lt,
            BinaryOperator::Lte => IndexProbeOp::Lte,
            BinaryOperator::Gt => IndexProbeOp::Gt,
            BinaryOperator::Gte => IndexProbeOp::Gte,
            _ => return None,
        };

        if let Some(qualifier) = &column.table {
            if !single_source && qualifier != reference_name {
                return None;
            }
        }

        let def = table.definition().get_column(&column.column)?;
        let value = literal_value(literal);
        if !table.has_index(&column.column) || !value.matches_type(&def.data_type) {
            return None;
        }

        Some(IndexProbe {
            column: column.column.clone(),
            op: probe_op,
            value,
        })
    }
}

/// Heuristic evaluation cost of one predicate
pub fn estimate_cost(predicate: &Expr) -> u32 {
    match predicate {
        Expr::BinaryOp {
            op: BinaryOperator::Eq,
            ..
        } => 1,
        Expr::BinaryOp { op, .. } if op.is_comparison() => 5,
        Expr::Like { .. } => 50,
        Expr::Function { .. } | Expr::Nested(_) => 100,
        _ => 20,
    }
}

fn flatten_chain<'e>(expr: &'e Expr, chain_op: BinaryOperator, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp { left, op, right } if *op == chain_op => {
            flatten_chain(left, chain_op, out);
            flatten_chain(right, chain_op, out);
        }
        other => out.push(other),
    }
}

fn strip_nesting(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => strip_nesting(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, TableDef};
    use crate::executor::eval::{eval_predicate, RowContext};
    use proptest::prelude::*;

    fn keyed_rows(prefix: &str, keys: &[i64]) -> Vec<Row> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| {
                Row::new()
                    .with(format!("{}.pos", prefix), i as i64)
                    .with(format!("{}.key", prefix), *k)
            })
            .collect()
    }

    fn join_condition() -> Expr {
        Expr::eq(Expr::qualified("a", "key"), Expr::qualified("b", "key"))
    }

    #[test]
    fn test_choose_join_strategy() {
        let optimizer = HeuristicOptimizer::default();
        let small = keyed_rows("a", &[1, 2, 3]);
        let large: Vec<i64> = (0..101).collect();
        let large_a = keyed_rows("a", &large);
        let large_b = keyed_rows("b", &large);
        let condition = join_condition();

        assert_eq!(
            optimizer.choose_join_strategy(&small, &large_b, Some(&condition)),
            JoinStrategy::NestedLoop
        );
        assert_eq!(
            optimizer.choose_join_strategy(&large_a, &large_b, Some(&condition)),
            JoinStrategy::SortMerge
        );
        let not_equi = Expr::binary(
            Expr::qualified("a", "key"),
            BinaryOperator::Lt,
            Expr::qualified("b", "key"),
        );
        assert_eq!(
            optimizer.choose_join_strategy(&large_a, &large_b, Some(&not_equi)),
            JoinStrategy::NestedLoop
        );
        assert_eq!(
            optimizer.choose_join_strategy(&large_a, &large_b, None),
            JoinStrategy::NestedLoop
        );

        let eager = HeuristicOptimizer::new(2);
        assert_eq!(
            eager.choose_join_strategy(&small, &small, Some(&condition)),
            JoinStrategy::SortMerge
        );
    }

    #[test]
    fn test_extract_join_keys() {
        let optimizer = HeuristicOptimizer::default();
        let (l, r) = optimizer.extract_join_keys(&join_condition()).unwrap();
        assert_eq!(l.to_string(), "a.key");
        assert_eq!(r.to_string(), "b.key");

        let literal = Expr::eq(Expr::col("a"), Expr::int(1));
        assert!(matches!(
            optimizer.extract_join_keys(&literal),
            Err(Error::UnsupportedPredicate(_))
        ));
    }

    #[test]
    fn test_sort_merge_duplicate_runs() {
        let optimizer = HeuristicOptimizer::default();
        let left = keyed_rows("a", &[2, 1, 2]);
        let right = keyed_rows("b", &[2, 3, 2, 1]);
        let (lk, rk) = optimizer.extract_join_keys(&join_condition()).unwrap();

        let mut pairs = optimizer.sort_merge_join(&left, &right, &lk, &rk);
        pairs.sort();
        assert_eq!(pairs, vec![(0, 0), (0, 2), (1, 3), (2, 0), (2, 2)]);
    }

    #[test]
    fn test_reorder_and_chain() {
        let optimizer = HeuristicOptimizer::default();
        let like = Expr::like(Expr::col("name"), "A%");
        let gt = Expr::binary(Expr::col("age"), BinaryOperator::Gt, Expr::int(20));
        let eq = Expr::eq(Expr::col("id"), Expr::int(1));
        let predicate = Expr::and(Expr::and(like.clone(), gt.clone()), eq.clone());

        let reordered = optimizer.reorder_conditions(&predicate);
        assert_eq!(reordered, Expr::and(Expr::and(eq, gt), like));
    }

    #[test]
    fn test_reorder_or_chain() {
        let optimizer = HeuristicOptimizer::default();
        let eq = Expr::eq(Expr::col("id"), Expr::int(1));
        let nested = Expr::nested(Expr::and(
            Expr::like(Expr::col("name"), "A%"),
            Expr::eq(Expr::col("age"), Expr::int(3)),
        ));
        let predicate = Expr::or(eq.clone(), nested);

        let reordered = optimizer.reorder_conditions(&predicate);
        let expected_nested = Expr::nested(Expr::and(
            Expr::eq(Expr::col("age"), Expr::int(3)),
            Expr::like(Expr::col("name"), "A%"),
        ));
        assert_eq!(reordered, Expr::or(expected_nested, eq));
    }

    #[test]
    fn test_index_probe() {
        let def = TableDef::new(
            "students",
            vec![
                Column::new("id", DataType::Int),
                Column::new("age", DataType::Int),
            ],
            "id",
        )
        .unwrap();
        let mut table = Table::new(def);
        table.create_index("age").unwrap();
        let optimizer = HeuristicOptimizer::default();

        let flipped = Expr::binary(Expr::int(20), BinaryOperator::Lt, Expr::col("age"));
        let probe = optimizer.index_probe(&table, "s", true, &flipped).unwrap();
        assert_eq!(probe.op, IndexProbeOp::Gt);
        assert_eq!(probe.value, Value::Integer(20));

        let wrong_type = Expr::eq(Expr::col("age"), Expr::text("20"));
        assert!(optimizer.index_probe(&table, "s", true, &wrong_type).is_none());

        let other_source = Expr::eq(Expr::qualified("e", "age"), Expr::int(20));
        assert!(optimizer.index_probe(&table, "s", false, &other_source).is_none());

        let neq = Expr::binary(Expr::col("id"), BinaryOperator::Neq, Expr::int(1));
        assert!(optimizer.index_probe(&table, "s", true, &neq).is_none());
    }

    fn arb_predicate() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            (0i64..5).prop_map(|v| Expr::eq(Expr::col("x"), Expr::int(v))),
            (0i64..5).prop_map(|v| Expr::binary(Expr::col("x"), BinaryOperator::Lt, Expr::int(v))),
            (0i64..5).prop_map(|v| Expr::binary(Expr::col("y"), BinaryOperator::Gte, Expr::int(v))),
            "[a-c]%".prop_map(|p| Expr::like(Expr::col("name"), p)),
        ];
        leaf.prop_recursive(3, 16, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::or(l, r)),
                inner.prop_map(Expr::nested),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_sort_merge_matches_nested_loop(
            left_keys in prop::collection::vec(0i64..8, 0..30),
            right_keys in prop::collection::vec(0i64..8, 0..30),
        ) {
            let optimizer = HeuristicOptimizer::default();
            let left = keyed_rows("a", &left_keys);
            let right = keyed_rows("b", &right_keys);
            let (lk, rk) = optimizer.extract_join_keys(&join_condition()).unwrap();

            let mut merged = optimizer.sort_merge_join(&left, &right, &lk, &rk);
            let mut looped = optimizer
                .nested_loop_join(&left, &right, |l, r| {
                    Ok(resolve_column(l, &lk) == resolve_column(r, &rk))
                })
                .unwrap();
            merged.sort();
            looped.sort();
            prop_assert_eq!(merged, looped);
        }

        #[test]
        fn prop_reordering_keeps_truth_value(
            predicate in arb_predicate(),
            x in 0i64..5,
            y in 0i64..5,
            name in "[a-c][a-c]",
        ) {
            let optimizer = HeuristicOptimizer::default();
            let row = Row::new().with("x", x).with("y", y).with("name", name);
            let ctx = RowContext::new(&row);

            let original = eval_predicate(&predicate, &ctx).unwrap();
            let reordered = eval_predicate(&optimizer.reorder_conditions(&predicate), &ctx).unwrap();
            prop_assert_eq!(original, reordered);
        }
    }
}
