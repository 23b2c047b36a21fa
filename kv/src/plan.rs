//! Query plan nodes (§4.5, §1.9): a tree of pull-based row sources and
//! transforms, executed as a plain `Iterator<Item = CResult<Row>>` the way
//! `mvcc::ScanIterator` is — no separate execution engine, just nested
//! iterators that each pull from the one below.

use crate::catalog::{Catalog, Index, Table};
use crate::encoding::{Key, SortDirection, Value};
use crate::error::{CResult, Error};
use crate::expr::{Environment, Expr, Parameters};
use crate::mvcc::Transaction;
use crate::storage::engine::Engine;
use crate::tree::{Range, Tree};
use crate::types::{compare_values, truthy, Row};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A source node seeds a row stream; every other node wraps one.
#[derive(Clone)]
pub enum Node {
    SeqScan { table: Table },
    PkScan { table: Table, range: Range },
    IndexScan { table: Table, index: Index, range: Range },
    Values { columns: Vec<String>, rows: Vec<Vec<Expr>> },
    Filter { source: Box<Node>, predicate: Expr },
    Project { source: Box<Node>, expressions: Vec<(Expr, Option<String>)> },
    Sort { source: Box<Node>, keys: Vec<(Expr, SortDirection)> },
    GroupBy { source: Box<Node>, group_by: Vec<Expr>, aggregates: Vec<Aggregate> },
    Distinct { source: Box<Node> },
    Take { source: Box<Node>, limit: u64 },
    Skip { source: Box<Node>, offset: u64 },
    Concat { sources: Vec<Node> },
    Union { sources: Vec<Node> },
    Set { source: Box<Node>, assignments: Vec<(String, Expr)> },
    Unset { source: Box<Node>, columns: Vec<String> },
    Validate { table: Table, source: Box<Node> },
    TableInsert { table: Table, source: Box<Node> },
    TableReplace { table: Table, source: Box<Node> },
    TableDelete { table: Table, source: Box<Node> },
    IndexInsert { table: Table, index: Index, source: Box<Node> },
    IndexDelete { index: Index, source: Box<Node> },
    /// Runs `primary` to completion and reports its rows, then runs each of
    /// `effects` in order purely for its side effects (their rows are
    /// discarded, their errors are not). Used to keep a DML statement's
    /// reported result to its table sink's row while still maintaining
    /// indexes in the same transaction.
    Effect { primary: Box<Node>, effects: Vec<Node> },
    Nothing,
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub argument: Option<Expr>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl Node {
    /// The column names this node's rows carry, in order.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Node::SeqScan { table } | Node::PkScan { table, .. } => {
                table.columns.iter().map(|c| c.name.clone()).collect()
            }
            Node::IndexScan { table, .. } => table.columns.iter().map(|c| c.name.clone()).collect(),
            Node::Values { columns, .. } => columns.clone(),
            Node::Filter { source, .. }
            | Node::Sort { source, .. }
            | Node::Distinct { source }
            | Node::Take { source, .. }
            | Node::Skip { source, .. } => source.columns(),
            Node::Project { expressions, .. } => expressions
                .iter()
                .enumerate()
                .map(|(i, (_, alias))| alias.clone().unwrap_or_else(|| format!("col{i}")))
                .collect(),
            Node::GroupBy { group_by, aggregates, .. } => {
                let mut columns: Vec<String> = (0..group_by.len()).map(|i| format!("key{i}")).collect();
                for agg in aggregates {
                    columns.push(agg.alias.clone().unwrap_or_else(|| format!("{:?}", agg.function)));
                }
                columns
            }
            Node::Concat { sources } | Node::Union { sources } => {
                sources.first().map(Node::columns).unwrap_or_default()
            }
            Node::Set { source, .. } | Node::Unset { source, .. } | Node::Validate { source, .. } => source.columns(),
            Node::TableInsert { .. }
            | Node::TableReplace { .. }
            | Node::TableDelete { .. }
            | Node::IndexInsert { .. }
            | Node::IndexDelete { .. } => vec!["count".to_string()],
            Node::Effect { primary, .. } => primary.columns(),
            Node::Nothing => vec![],
        }
    }

    /// Whether executing this node mutates stored data (§4.7: statements
    /// that touch writes need a writable transaction).
    pub fn requires_write(&self) -> bool {
        match self {
            Node::TableInsert { .. }
            | Node::TableReplace { .. }
            | Node::TableDelete { .. }
            | Node::IndexInsert { .. }
            | Node::IndexDelete { .. } => true,
            Node::Filter { source, .. }
            | Node::Project { source, .. }
            | Node::Sort { source, .. }
            | Node::GroupBy { source, .. }
            | Node::Distinct { source }
            | Node::Take { source, .. }
            | Node::Skip { source, .. }
            | Node::Set { source, .. }
            | Node::Unset { source, .. }
            | Node::Validate { source, .. } => source.requires_write(),
            Node::Concat { sources } | Node::Union { sources } => sources.iter().any(Node::requires_write),
            Node::Effect { primary, effects } => primary.requires_write() || effects.iter().any(Node::requires_write),
            _ => false,
        }
    }

    /// Executes this node against `txn`, yielding its row stream. Each
    /// node pulls from its source lazily; only `Sort`, `GroupBy`, and
    /// `Distinct` must materialize their input first.
    pub fn execute<'a, E: Engine>(
        self,
        txn: &'a Transaction<E>,
        catalog: &'a Catalog,
        parameters: &'a Parameters,
    ) -> CResult<Box<dyn Iterator<Item = CResult<Row>> + 'a>> {
        match self {
            Node::Nothing => Ok(Box::new(std::iter::empty())),

            Node::SeqScan { table } => {
                let columns: Arc<[String]> = Arc::from(table.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
                let tree = Tree::new(txn, table.namespace, vec![]);
                let mut rows = Vec::new();
                tree.iterate_on_range(&Range::all(), false, |key, value| {
                    let values: Vec<Value> = bincode::deserialize(&value)?;
                    let row = Row::new(Arc::from(table.name.as_str()), columns.clone(), values)
                        .with_primary_key(key.encode(table.namespace, &[]));
                    rows.push(Ok(row));
                    Ok(true)
                })?;
                Ok(Box::new(rows.into_iter()))
            }

            Node::PkScan { table, range } => {
                let columns: Arc<[String]> = Arc::from(table.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
                let tree = Tree::new(txn, table.namespace, vec![]);
                let mut rows = Vec::new();
                tree.iterate_on_range(&range, false, |key, value| {
                    let values: Vec<Value> = bincode::deserialize(&value)?;
                    let row = Row::new(Arc::from(table.name.as_str()), columns.clone(), values)
                        .with_primary_key(key.encode(table.namespace, &[]));
                    rows.push(Ok(row));
                    Ok(true)
                })?;
                Ok(Box::new(rows.into_iter()))
            }

            Node::IndexScan { table, index, range } => {
                let columns: Arc<[String]> = Arc::from(table.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
                let index_tree = Tree::new(txn, index.namespace, index.directions.clone());
                let table_tree = Tree::new(txn, table.namespace, vec![]);
                let mut rows = Vec::new();
                index_tree.iterate_on_range(&range, false, |_, pk_bytes| {
                    let pk: Key = bincode::deserialize(&pk_bytes)?;
                    if let Some(value) = table_tree.get(&pk)? {
                        let values: Vec<Value> = bincode::deserialize(&value)?;
                        rows.push(Ok(Row::new(Arc::from(table.name.as_str()), columns.clone(), values)
                            .with_primary_key(pk.encode(table.namespace, &[]))));
                    }
                    Ok(true)
                })?;
                Ok(Box::new(rows.into_iter()))
            }

            Node::Values { columns, rows } => {
                let columns: Arc<[String]> = Arc::from(columns);
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let env = Environment::new(parameters);
                    let values = row.iter().map(|e| e.evaluate(&env)).collect::<CResult<Vec<_>>>();
                    out.push(values.map(|values| Row::new(Arc::from("values"), columns.clone(), values)));
                }
                Ok(Box::new(out.into_iter()))
            }

            Node::Filter { source, predicate } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.filter_map(move |row| match row {
                    Ok(row) => {
                        let env = Environment::with_row(parameters, &row);
                        match predicate.evaluate(&env) {
                            Ok(value) if truthy(&value) => Some(Ok(row)),
                            Ok(_) => None,
                            Err(e) => Some(Err(e)),
                        }
                    }
                    Err(e) => Some(Err(e)),
                })))
            }

            Node::Project { source, expressions } => {
                let input = source.execute(txn, catalog, parameters)?;
                let out_columns: Arc<[String]> = Arc::from(
                    expressions
                        .iter()
                        .enumerate()
                        .map(|(i, (_, alias))| alias.clone().unwrap_or_else(|| format!("col{i}")))
                        .collect::<Vec<_>>(),
                );
                Ok(Box::new(input.map(move |row| {
                    let row = row?;
                    let env = Environment::with_row(parameters, &row);
                    let values = expressions.iter().map(|(e, _)| e.evaluate(&env)).collect::<CResult<Vec<_>>>()?;
                    Ok(Row::new(row.table.clone(), out_columns.clone(), values))
                })))
            }

            Node::Sort { source, keys } => {
                let input = source.execute(txn, catalog, parameters)?;
                let mut rows = input.collect::<CResult<Vec<_>>>()?;
                let mut sort_err = None;
                rows.sort_by(|a, b| {
                    for (expr, direction) in &keys {
                        let env_a = Environment::with_row(parameters, a);
                        let env_b = Environment::with_row(parameters, b);
                        let (va, vb) = match (expr.evaluate(&env_a), expr.evaluate(&env_b)) {
                            (Ok(va), Ok(vb)) => (va, vb),
                            (Err(e), _) | (_, Err(e)) => {
                                sort_err.get_or_insert(e);
                                continue;
                            }
                        };
                        let ordering = compare_values(&va, &vb).unwrap_or(Ordering::Equal);
                        let ordering = if direction.is_desc() { ordering.reverse() } else { ordering };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                    Ordering::Equal
                });
                if let Some(e) = sort_err {
                    return Err(e);
                }
                Ok(Box::new(rows.into_iter().map(Ok)))
            }

            Node::Distinct { source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let mut seen: Vec<Vec<Value>> = Vec::new();
                let mut out = Vec::new();
                for row in input {
                    let row = row?;
                    if !seen.contains(&row.values) {
                        seen.push(row.values.clone());
                        out.push(Ok(row));
                    }
                }
                Ok(Box::new(out.into_iter()))
            }

            Node::Take { source, limit } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.take(limit as usize)))
            }

            Node::Skip { source, offset } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.skip(offset as usize)))
            }

            Node::Concat { sources } => {
                let mut chained: Box<dyn Iterator<Item = CResult<Row>>> = Box::new(std::iter::empty());
                for source in sources {
                    chained = Box::new(chained.chain(source.execute(txn, catalog, parameters)?));
                }
                Ok(chained)
            }

            // Runs `primary` first so its rows are what the statement
            // reports, then drains each of `effects` in order for their
            // writes alone (index maintenance riding along a table sink).
            Node::Effect { primary, effects } => {
                let rows: Vec<Row> = primary.execute(txn, catalog, parameters)?.collect::<CResult<Vec<_>>>()?;
                for effect in effects {
                    let mut iter = effect.execute(txn, catalog, parameters)?;
                    for row in iter.by_ref() {
                        row?;
                    }
                }
                Ok(Box::new(rows.into_iter().map(Ok)))
            }

            // `UNION` without `ALL`: concatenate then drop duplicate rows,
            // same dedup rule as `Distinct`.
            Node::Union { sources } => {
                let mut chained: Box<dyn Iterator<Item = CResult<Row>>> = Box::new(std::iter::empty());
                for source in sources {
                    chained = Box::new(chained.chain(source.execute(txn, catalog, parameters)?));
                }
                Node::Distinct { source: Box::new(Node::Nothing) }.execute_over(chained)
            }

            Node::Set { source, assignments } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.map(move |row| {
                    let row = row?;
                    let mut values = row.values.clone();
                    for (column, expr) in &assignments {
                        let env = Environment::with_row(parameters, &row);
                        let value = expr.evaluate(&env)?;
                        if let Some(i) = row.columns.iter().position(|c| c == column) {
                            values[i] = value;
                        }
                    }
                    Ok(Row { values, ..row })
                })))
            }

            Node::Unset { source, columns } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.map(move |row| {
                    let row = row?;
                    let kept: Vec<String> =
                        row.columns.iter().filter(|c| !columns.contains(c)).cloned().collect();
                    let values: Vec<Value> = row
                        .columns
                        .iter()
                        .zip(row.values.iter())
                        .filter(|(c, _)| !columns.contains(c))
                        .map(|(_, v)| v.clone())
                        .collect();
                    Ok(Row::new(row.table.clone(), Arc::from(kept), values))
                })))
            }

            Node::GroupBy { source, group_by, aggregates } => {
                execute_group_by(source.execute(txn, catalog, parameters)?, &group_by, &aggregates, parameters)
            }

            // NOT NULL / DEFAULT / type conversion / CHECK, applied in that
            // order just above a table sink (§4.5 "validate").
            Node::Validate { table, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                Ok(Box::new(input.map(move |row| {
                    let row = row?;
                    let mut values = row.values.clone();
                    for (i, column) in table.columns.iter().enumerate() {
                        if i >= values.len() {
                            break;
                        }
                        if values[i].is_null() {
                            if let Some(default) = &column.default {
                                let env = Environment::with_row(parameters, &row);
                                values[i] = default.evaluate(&env)?;
                            }
                        }
                        if values[i].is_null() {
                            if !column.nullable {
                                return Err(Error::Constraint(format!(
                                    "NOT NULL constraint failed: {}.{}",
                                    table.name, column.name
                                )));
                            }
                        } else {
                            values[i] = coerce_column_value(values[i].clone(), &column.data_type)?;
                        }
                    }
                    let validated = Row { values, ..row };
                    for column in &table.columns {
                        if let Some(check) = &column.check {
                            let env = Environment::with_row(parameters, &validated);
                            if !truthy(&check.evaluate(&env)?) {
                                return Err(Error::Constraint(format!(
                                    "CHECK constraint failed: {}.{}",
                                    table.name, column.name
                                )));
                            }
                        }
                    }
                    Ok(validated)
                })))
            }

            Node::TableInsert { table, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let tree = Tree::new(txn, table.namespace, vec![]);
                let mut count = 0i64;
                for row in input {
                    let row = row?;
                    let pk = primary_key_of(&table, &row)?;
                    if tree.get(&pk)?.is_some() {
                        return Err(Error::Constraint(format!("duplicate primary key in table {}", table.name)));
                    }
                    tree.put(&pk, bincode::serialize(&row.values)?)?;
                    count += 1;
                }
                Ok(Box::new(std::iter::once(Ok(count_row("insert", count)))))
            }

            // Like `TableInsert`, but replaces an existing row by primary
            // key rather than requiring it to be absent (used by `UPDATE`).
            Node::TableReplace { table, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let tree = Tree::new(txn, table.namespace, vec![]);
                let mut count = 0i64;
                for row in input {
                    let row = row?;
                    let pk = primary_key_of(&table, &row)?;
                    tree.put(&pk, bincode::serialize(&row.values)?)?;
                    count += 1;
                }
                Ok(Box::new(std::iter::once(Ok(count_row("replace", count)))))
            }

            Node::TableDelete { table, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let tree = Tree::new(txn, table.namespace, vec![]);
                let mut count = 0i64;
                for row in input {
                    let row = row?;
                    let pk = primary_key_of(&table, &row)?;
                    tree.delete(&pk)?;
                    count += 1;
                }
                Ok(Box::new(std::iter::once(Ok(count_row("delete", count)))))
            }

            Node::IndexInsert { table, index, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let tree = Tree::new(txn, index.namespace, index.directions.clone());
                let mut count = 0i64;
                for row in input {
                    let row = row?;
                    let pk = primary_key_of(&table, &row)?;
                    let index_key = index_key_of(&index, &row)?;
                    if index.unique && tree.get(&index_key)?.is_some() {
                        return Err(Error::Constraint(format!("duplicate key for unique index {}", index.name)));
                    }
                    tree.put(&index_key, bincode::serialize(&pk)?)?;
                    count += 1;
                }
                Ok(Box::new(std::iter::once(Ok(count_row("index_insert", count)))))
            }

            Node::IndexDelete { index, source } => {
                let input = source.execute(txn, catalog, parameters)?;
                let tree = Tree::new(txn, index.namespace, index.directions.clone());
                let mut count = 0i64;
                for row in input {
                    let row = row?;
                    let index_key = index_key_of(&index, &row)?;
                    tree.delete(&index_key)?;
                    count += 1;
                }
                Ok(Box::new(std::iter::once(Ok(count_row("index_delete", count)))))
            }
        }
    }

    /// Runs `Distinct`'s dedup logic over an already-produced iterator,
    /// for use by `Union` (concat, then drop repeats).
    fn execute_over<'a>(
        self,
        input: Box<dyn Iterator<Item = CResult<Row>> + 'a>,
    ) -> CResult<Box<dyn Iterator<Item = CResult<Row>> + 'a>> {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        let mut out = Vec::new();
        for row in input {
            let row = row?;
            if !seen.contains(&row.values) {
                seen.push(row.values.clone());
                out.push(Ok(row));
            }
        }
        Ok(Box::new(out.into_iter()))
    }
}

/// Coerces `value` to `data_type` for the column types `expr::cast` knows
/// how to convert between; other declared types (e.g. `BOOLEAN`, `BLOB`)
/// pass through untouched, matching the looser typing those columns had
/// before validation existed.
fn coerce_column_value(value: Value, data_type: &str) -> CResult<Value> {
    match data_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "FLOAT" | "DOUBLE" | "TEXT" => crate::expr::cast(&value, data_type),
        _ => Ok(value),
    }
}

fn count_row(label: &str, count: i64) -> Row {
    Row::new(Arc::from(label), Arc::from(vec!["count".to_string()]), vec![Value::Integer(count)])
}

fn index_key_of(index: &Index, row: &Row) -> CResult<Key> {
    let values = index
        .columns
        .iter()
        .map(|name| row.get(name).cloned().ok_or_else(|| Error::Constraint(format!("missing index column {name}"))))
        .collect::<CResult<Vec<_>>>()?;
    Ok(Key::new(values))
}

fn primary_key_of(table: &Table, row: &Row) -> CResult<Key> {
    let values = table
        .primary_key_columns()
        .iter()
        .map(|name| row.get(name).cloned().ok_or_else(|| Error::Constraint(format!("missing primary key column {name}"))))
        .collect::<CResult<Vec<_>>>()?;
    Ok(Key::new(values))
}

fn execute_group_by<'a>(
    input: Box<dyn Iterator<Item = CResult<Row>> + 'a>,
    group_by: &'a [Expr],
    aggregates: &'a [Aggregate],
    parameters: &'a Parameters,
) -> CResult<Box<dyn Iterator<Item = CResult<Row>> + 'a>> {
    // Aggregation needs the full input before it can emit a single row per
    // group, so (like `Sort`) this node materializes eagerly.
    let mut groups: Vec<(Vec<Value>, Vec<AccumulatorState>)> = Vec::new();
    for row in input {
        let row = row?;
        let env = Environment::with_row(parameters, &row);
        let key: Vec<Value> = group_by.iter().map(|e| e.evaluate(&env)).collect::<CResult<Vec<_>>>()?;
        let slot = match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, accumulators)) => accumulators,
            None => {
                groups.push((key, aggregates.iter().map(|a| AccumulatorState::new(a.function)).collect()));
                &mut groups.last_mut().unwrap().1
            }
        };
        for (accumulator, aggregate) in slot.iter_mut().zip(aggregates) {
            let value = match &aggregate.argument {
                Some(expr) => expr.evaluate(&env)?,
                None => Value::Integer(1), // COUNT(*)
            };
            accumulator.accumulate(&value);
        }
    }
    let rows = groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut values = key;
            values.extend(accumulators.into_iter().map(AccumulatorState::finish));
            Ok(Row::new(
                Arc::from("group"),
                Arc::from((0..values.len()).map(|i| format!("col{i}")).collect::<Vec<_>>()),
                values,
            ))
        })
        .collect::<Vec<CResult<Row>>>();
    Ok(Box::new(rows.into_iter()))
}

#[derive(Clone)]
struct AccumulatorState {
    function: AggregateFunction,
    count: i64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
}

impl AccumulatorState {
    fn new(function: AggregateFunction) -> Self {
        AccumulatorState { function, count: 0, sum: 0.0, min: None, max: None }
    }

    fn accumulate(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Value::Integer(i) = value {
            self.sum += *i as f64;
        } else if let Value::Float(f) = value {
            self.sum += f;
        }
        if self.min.as_ref().and_then(|m| compare_values(value, m)).map(|o| o == Ordering::Less).unwrap_or(true) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().and_then(|m| compare_values(value, m)).map(|o| o == Ordering::Greater).unwrap_or(true) {
            self.max = Some(value.clone());
        }
    }

    fn finish(self) -> Value {
        match self.function {
            AggregateFunction::Count => Value::Integer(self.count),
            AggregateFunction::Sum => Value::Float(self.sum),
            AggregateFunction::Min => self.min.unwrap_or(Value::Null),
            AggregateFunction::Max => self.max.unwrap_or(Value::Null),
            AggregateFunction::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Float(self.sum / self.count as f64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::mvcc::{MVCCDef, MVCC};
    use crate::storage::memory::Memory;

    fn sample_table() -> Table {
        Table {
            name: "t".into(),
            namespace: 101,
            columns: vec![
                Column { name: "id".into(), data_type: "integer".into(), nullable: false, default: None, primary_key: true, unique: false, check: None },
                Column { name: "n".into(), data_type: "integer".into(), nullable: false, default: None, primary_key: false, unique: false, check: None },
            ],
            sql: String::new(),
        }
    }

    #[test]
    fn values_and_filter() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let values = Node::Values {
            columns: vec!["n".into()],
            rows: vec![
                vec![Expr::Literal(Value::Integer(1))],
                vec![Expr::Literal(Value::Integer(2))],
                vec![Expr::Literal(Value::Integer(3))],
            ],
        };
        let filtered = Node::Filter {
            source: Box::new(values),
            predicate: Expr::Comparison(
                crate::expr::CompareOp::Gt,
                Box::new(Expr::Column("n".into())),
                Box::new(Expr::Literal(Value::Integer(1))),
            ),
        };
        let rows: Vec<Row> = filtered.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn insert_then_seq_scan_round_trips() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let table = sample_table();
        let insert = Node::TableInsert {
            table: table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(10))]],
            }),
        };
        insert.execute(&txn, &catalog, &parameters)?.collect::<CResult<Vec<_>>>()?;
        let scanned: Vec<Row> =
            Node::SeqScan { table }.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].get("n"), Some(&Value::Integer(10)));
        Ok(())
    }

    #[test]
    fn table_insert_rejects_duplicate_primary_key() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let table = sample_table();
        let first = Node::TableInsert {
            table: table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(10))]],
            }),
        };
        first.execute(&txn, &catalog, &parameters)?.collect::<CResult<Vec<_>>>()?;
        let second = Node::TableInsert {
            table: table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(99))]],
            }),
        };
        let err = second.execute(&txn, &catalog, &parameters).unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        let scanned: Vec<Row> =
            Node::SeqScan { table }.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].get("n"), Some(&Value::Integer(10)));
        Ok(())
    }

    #[test]
    fn validate_substitutes_default_and_rejects_not_null() -> CResult<()> {
        let table = Table {
            name: "t".into(),
            namespace: 102,
            columns: vec![
                Column { name: "id".into(), data_type: "integer".into(), nullable: false, default: None, primary_key: true, unique: false, check: None },
                Column {
                    name: "n".into(),
                    data_type: "integer".into(),
                    nullable: false,
                    default: Some(Expr::Literal(Value::Integer(7))),
                    primary_key: false,
                    unique: false,
                    check: None,
                },
            ],
            sql: String::new(),
        };
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;

        let validated = Node::Validate {
            table: table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Null)]],
            }),
        };
        let rows: Vec<Row> = validated.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(rows[0].get("n"), Some(&Value::Integer(7)));

        let missing_required = Node::Validate {
            table: Table {
                columns: vec![
                    table.columns[0].clone(),
                    Column {
                        name: "n".into(),
                        data_type: "integer".into(),
                        nullable: false,
                        default: None,
                        primary_key: false,
                        unique: false,
                        check: None,
                    },
                ],
                ..table
            },
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(2)), Expr::Literal(Value::Null)]],
            }),
        };
        let err = missing_required.execute(&txn, &catalog, &parameters)?.collect::<CResult<Vec<_>>>().unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        Ok(())
    }

    #[test]
    fn effect_reports_primary_rows_and_still_runs_effects() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let table = sample_table();
        let side_table = Table { name: "side".into(), namespace: 103, columns: table.columns.clone(), sql: String::new() };

        let insert = Node::TableInsert {
            table: table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(10))]],
            }),
        };
        let side_effect = Node::TableInsert {
            table: side_table.clone(),
            source: Box::new(Node::Values {
                columns: vec!["id".into(), "n".into()],
                rows: vec![vec![Expr::Literal(Value::Integer(5)), Expr::Literal(Value::Integer(50))]],
            }),
        };
        let plan = Node::Effect { primary: Box::new(insert), effects: vec![side_effect] };
        let rows: Vec<Row> = plan.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("count"), Some(&Value::Integer(1)));

        let side_rows: Vec<Row> =
            Node::SeqScan { table: side_table }.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(side_rows.len(), 1);
        Ok(())
    }

    #[test]
    fn group_by_counts_and_sums() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let values = Node::Values {
            columns: vec!["g".into(), "n".into()],
            rows: vec![
                vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(10))],
                vec![Expr::Literal(Value::Integer(1)), Expr::Literal(Value::Integer(20))],
                vec![Expr::Literal(Value::Integer(2)), Expr::Literal(Value::Integer(5))],
            ],
        };
        let grouped = Node::GroupBy {
            source: Box::new(values),
            group_by: vec![Expr::Column("g".into())],
            aggregates: vec![Aggregate {
                function: AggregateFunction::Sum,
                argument: Some(Expr::Column("n".into())),
                alias: Some("total".into()),
            }],
        };
        let rows: Vec<Row> = grouped.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn take_and_skip_paginate() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let catalog = Catalog::load(&txn)?;
        let parameters = Parameters::None;
        let values = Node::Values {
            columns: vec!["n".into()],
            rows: (1..=5).map(|i| vec![Expr::Literal(Value::Integer(i))]).collect(),
        };
        let paged = Node::Take { source: Box::new(Node::Skip { source: Box::new(values), offset: 1 }), limit: 2 };
        let rows: Vec<Row> = paged.execute(&txn, &catalog, &parameters)?.collect::<CResult<_>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("n"), Some(&Value::Integer(2)));
        Ok(())
    }
}
