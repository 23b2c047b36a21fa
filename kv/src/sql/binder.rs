//! Binds a parsed [`super::ast::Statement`] against a [`Catalog`] into a
//! naive, unoptimized [`crate::plan::Node`] tree (§4.5 "naive plan" input
//! to the planner). Column references are resolved by name against the
//! table in scope; nothing here picks indexes — that's `planner`'s job.

use super::ast::{self, BinaryOp, Expression, Literal, ParameterRef, Select, Statement, UnaryOp};
use crate::catalog::{Catalog, Column};
use crate::encoding::{SortDirection, Value};
use crate::error::{CResult, Error};
use crate::expr::{ArithOp, CompareOp, Expr, LogicalOp, Parameter};
use crate::plan::{Aggregate, AggregateFunction, Node};

/// A bound, executable statement: either a data-definition action applied
/// directly against the catalog, or a plan to run through the planner.
pub enum Bound {
    Catalog(CatalogAction),
    Transaction(TransactionAction),
    Plan(Node),
}

pub enum CatalogAction {
    CreateTable { name: String, columns: Vec<Column>, sql: String },
    DropTable { name: String, if_exists: bool },
    CreateIndex { name: String, table: String, columns: Vec<String>, directions: Vec<SortDirection>, unique: bool, sql: String },
    DropIndex { name: String, if_exists: bool },
    CreateSequence { name: String, start: i64, increment: i64, min: Option<i64>, max: Option<i64>, cycle: bool, cache: i64 },
    DropSequence { name: String, if_exists: bool },
}

pub enum TransactionAction {
    Begin { read_only: bool },
    Commit,
    Rollback,
}

pub fn bind(statement: Statement, catalog: &Catalog) -> CResult<Bound> {
    reset_positional_counter();
    match statement {
        Statement::CreateTable { name, columns, sql } => {
            let columns = columns
                .into_iter()
                .map(|c| {
                    Ok(Column {
                        name: c.name,
                        data_type: c.data_type,
                        nullable: c.nullable,
                        default: c.default.as_ref().map(bind_expr).transpose()?,
                        primary_key: c.primary_key,
                        unique: c.unique,
                        check: c.check.as_ref().map(bind_expr).transpose()?,
                    })
                })
                .collect::<CResult<Vec<_>>>()?;
            Ok(Bound::Catalog(CatalogAction::CreateTable { name, columns, sql }))
        }
        Statement::DropTable { name, if_exists } => Ok(Bound::Catalog(CatalogAction::DropTable { name, if_exists })),
        Statement::CreateIndex { name, table, columns, unique, sql } => {
            let directions = columns.iter().map(|(_, d)| direction(*d)).collect();
            let columns = columns.into_iter().map(|(c, _)| c).collect();
            Ok(Bound::Catalog(CatalogAction::CreateIndex { name, table, columns, directions, unique, sql }))
        }
        Statement::DropIndex { name, if_exists } => Ok(Bound::Catalog(CatalogAction::DropIndex { name, if_exists })),
        Statement::CreateSequence { name, increment, min, max, start, cache, cycle } => {
            Ok(Bound::Catalog(CatalogAction::CreateSequence {
                name,
                start: start.unwrap_or(min.unwrap_or(1)),
                increment,
                min,
                max,
                cycle,
                cache,
            }))
        }
        Statement::DropSequence { name, if_exists } => Ok(Bound::Catalog(CatalogAction::DropSequence { name, if_exists })),
        Statement::Begin { read_only } => Ok(Bound::Transaction(TransactionAction::Begin { read_only })),
        Statement::Commit => Ok(Bound::Transaction(TransactionAction::Commit)),
        Statement::Rollback => Ok(Bound::Transaction(TransactionAction::Rollback)),

        Statement::Insert { table, columns, values } => {
            let bound_table = catalog.table(&table)?;
            let target_columns = columns.unwrap_or_else(|| bound_table.columns.iter().map(|c| c.name.clone()).collect());
            let rows = values
                .into_iter()
                .map(|row| {
                    if row.len() != target_columns.len() {
                        return Err(Error::Constraint("value count does not match column count".into()));
                    }
                    bound_table
                        .columns
                        .iter()
                        .map(|col| match target_columns.iter().position(|c| c == &col.name) {
                            Some(i) => bind_expr(&row[i]),
                            None => Ok(Expr::Literal(Value::Null)),
                        })
                        .collect::<CResult<Vec<_>>>()
                })
                .collect::<CResult<Vec<_>>>()?;
            let validated = Node::Validate {
                table: bound_table.clone(),
                source: Box::new(Node::Values {
                    columns: bound_table.columns.iter().map(|c| c.name.clone()).collect(),
                    rows,
                }),
            };
            let insert = Node::TableInsert { table: bound_table.clone(), source: Box::new(validated.clone()) };
            let effects = catalog
                .indexes_on(&table)
                .into_iter()
                .map(|index| Node::IndexInsert {
                    table: bound_table.clone(),
                    index: index.clone(),
                    source: Box::new(validated.clone()),
                })
                .collect();
            Ok(Bound::Plan(Node::Effect { primary: Box::new(insert), effects }))
        }

        Statement::Update { table, assignments, filter } => {
            let bound_table = catalog.table(&table)?;
            let mut scan = Node::SeqScan { table: bound_table.clone() };
            if let Some(filter) = filter {
                scan = Node::Filter { source: Box::new(scan), predicate: bind_expr(&filter)? };
            }
            let assignments =
                assignments.into_iter().map(|(c, e)| Ok((c, bind_expr(&e)?))).collect::<CResult<Vec<_>>>()?;
            let set = Node::Set { source: Box::new(scan.clone()), assignments };
            let validated = Node::Validate { table: bound_table.clone(), source: Box::new(set) };
            // Index entries keyed on pre-update values must come out before
            // the new values go in, so every index is deleted from the old
            // scan before it's re-inserted from the validated (post-
            // assignment) rows; the table replace itself can run alongside.
            let replace = Node::TableReplace { table: bound_table.clone(), source: Box::new(validated.clone()) };
            let mut effects: Vec<Node> = catalog
                .indexes_on(&table)
                .into_iter()
                .map(|index| Node::IndexDelete { index: index.clone(), source: Box::new(scan.clone()) })
                .collect();
            effects.extend(catalog.indexes_on(&table).into_iter().map(|index| Node::IndexInsert {
                table: bound_table.clone(),
                index: index.clone(),
                source: Box::new(validated.clone()),
            }));
            Ok(Bound::Plan(Node::Effect { primary: Box::new(replace), effects }))
        }

        Statement::Delete { table, filter } => {
            let bound_table = catalog.table(&table)?;
            let mut scan = Node::SeqScan { table: bound_table.clone() };
            if let Some(filter) = filter {
                scan = Node::Filter { source: Box::new(scan), predicate: bind_expr(&filter)? };
            }
            let delete = Node::TableDelete { table: bound_table.clone(), source: Box::new(scan.clone()) };
            let effects = catalog
                .indexes_on(&table)
                .into_iter()
                .map(|index| Node::IndexDelete { index: index.clone(), source: Box::new(scan.clone()) })
                .collect();
            Ok(Bound::Plan(Node::Effect { primary: Box::new(delete), effects }))
        }

        Statement::Select(select) => Ok(Bound::Plan(bind_select(select, catalog)?)),
    }
}

fn direction(d: ast::Direction) -> SortDirection {
    match d {
        ast::Direction::Asc => SortDirection::Asc,
        ast::Direction::Desc => SortDirection::Desc,
    }
}

fn bind_select(select: Select, catalog: &Catalog) -> CResult<Node> {
    let table = catalog.table(&select.from)?.clone();
    let mut node = Node::SeqScan { table };

    if let Some(filter) = &select.filter {
        node = Node::Filter { source: Box::new(node), predicate: bind_expr(filter)? };
    }

    if !select.group_by.is_empty() || has_aggregate(&select.columns) {
        let group_by = select.group_by.iter().map(bind_expr).collect::<CResult<Vec<_>>>()?;
        let aggregates = select
            .columns
            .iter()
            .filter_map(|(e, alias)| as_aggregate(e, alias.clone()))
            .collect::<CResult<Vec<_>>>()?;
        node = Node::GroupBy { source: Box::new(node), group_by, aggregates };
        if let Some(having) = &select.having {
            node = Node::Filter { source: Box::new(node), predicate: bind_expr(having)? };
        }
    } else if is_wildcard(&select.columns) {
        // a wildcard projection keeps the row as-is
    } else {
        let expressions = select
            .columns
            .iter()
            .map(|(e, alias)| Ok((bind_expr(e)?, alias.clone())))
            .collect::<CResult<Vec<_>>>()?;
        node = Node::Project { source: Box::new(node), expressions };
    }

    if !select.order_by.is_empty() {
        let keys = select
            .order_by
            .iter()
            .map(|(e, d)| Ok((bind_expr(e)?, direction(*d))))
            .collect::<CResult<Vec<_>>>()?;
        node = Node::Sort { source: Box::new(node), keys };
    }

    if select.distinct {
        node = Node::Distinct { source: Box::new(node) };
    }

    if let Some(offset) = &select.offset {
        node = Node::Skip { source: Box::new(node), offset: literal_u64(offset)? };
    }
    if let Some(limit) = &select.limit {
        node = Node::Take { source: Box::new(node), limit: literal_u64(limit)? };
    }

    if let Some((rhs, all)) = select.union {
        let rhs = bind_select(*rhs, catalog)?;
        node = if all {
            Node::Concat { sources: vec![node, rhs] }
        } else {
            Node::Union { sources: vec![node, rhs] }
        };
    }

    Ok(node)
}

fn literal_u64(expr: &Expression) -> CResult<u64> {
    match expr {
        Expression::Literal(Literal::Integer(i)) if *i >= 0 => Ok(*i as u64),
        _ => Err(Error::Parse("LIMIT/OFFSET require a non-negative integer literal".into())),
    }
}

fn has_aggregate(columns: &[(Expression, Option<String>)]) -> bool {
    columns.iter().any(|(e, _)| is_aggregate_call(e))
}

fn is_wildcard(columns: &[(Expression, Option<String>)]) -> bool {
    matches!(columns, [(Expression::Column(name), None)] if name == "*")
}

fn is_aggregate_call(expr: &Expression) -> bool {
    matches!(expr, Expression::Function(name, _) if aggregate_function(name).is_some())
}

fn aggregate_function(name: &str) -> Option<AggregateFunction> {
    match name.to_ascii_uppercase().as_str() {
        "COUNT" => Some(AggregateFunction::Count),
        "SUM" => Some(AggregateFunction::Sum),
        "MIN" => Some(AggregateFunction::Min),
        "MAX" => Some(AggregateFunction::Max),
        "AVG" => Some(AggregateFunction::Avg),
        _ => None,
    }
}

fn as_aggregate(expr: &Expression, alias: Option<String>) -> Option<CResult<Aggregate>> {
    let Expression::Function(name, args) = expr else { return None };
    let function = aggregate_function(name)?;
    let argument = match args.first() {
        Some(Expression::Column(c)) if c == "*" => None,
        Some(e) => Some(bind_expr(e)),
        None => None,
    };
    let argument = match argument {
        Some(Ok(e)) => Some(e),
        Some(Err(e)) => return Some(Err(e)),
        None => None,
    };
    Some(Ok(Aggregate { function, argument, alias }))
}

fn bind_expr(expr: &Expression) -> CResult<Expr> {
    Ok(match expr {
        Expression::Literal(Literal::Null) => Expr::Literal(Value::Null),
        Expression::Literal(Literal::Boolean(b)) => Expr::Literal(Value::Boolean(*b)),
        Expression::Literal(Literal::Integer(i)) => Expr::Literal(Value::Integer(*i)),
        Expression::Literal(Literal::Float(f)) => Expr::Literal(Value::Float(*f)),
        Expression::Literal(Literal::String(s)) => Expr::Literal(Value::Text(s.clone())),
        Expression::Parameter(ParameterRef::Positional) => {
            Expr::Parameter(Parameter::Positional(POSITIONAL_COUNTER.with(|c| {
                let i = c.get();
                c.set(i + 1);
                i
            })))
        }
        Expression::Parameter(ParameterRef::Named(name)) => Expr::Parameter(Parameter::Named(name.clone())),
        Expression::Column(name) => Expr::Column(name.clone()),
        Expression::UnaryOp(UnaryOp::Not, inner) => Expr::Not(Box::new(bind_expr(inner)?)),
        Expression::UnaryOp(UnaryOp::Neg, inner) => Expr::Arithmetic(
            ArithOp::Sub,
            Box::new(Expr::Literal(Value::Integer(0))),
            Box::new(bind_expr(inner)?),
        ),
        Expression::BinaryOp(op, lhs, rhs) => {
            let lhs = Box::new(bind_expr(lhs)?);
            let rhs = Box::new(bind_expr(rhs)?);
            match op {
                BinaryOp::And => Expr::Logical(LogicalOp::And, lhs, rhs),
                BinaryOp::Or => Expr::Logical(LogicalOp::Or, lhs, rhs),
                BinaryOp::Eq => Expr::Comparison(CompareOp::Eq, lhs, rhs),
                BinaryOp::Ne => Expr::Comparison(CompareOp::Ne, lhs, rhs),
                BinaryOp::Lt => Expr::Comparison(CompareOp::Lt, lhs, rhs),
                BinaryOp::Le => Expr::Comparison(CompareOp::Le, lhs, rhs),
                BinaryOp::Gt => Expr::Comparison(CompareOp::Gt, lhs, rhs),
                BinaryOp::Ge => Expr::Comparison(CompareOp::Ge, lhs, rhs),
                BinaryOp::Add => Expr::Arithmetic(ArithOp::Add, lhs, rhs),
                BinaryOp::Sub => Expr::Arithmetic(ArithOp::Sub, lhs, rhs),
                BinaryOp::Mul => Expr::Arithmetic(ArithOp::Mul, lhs, rhs),
                BinaryOp::Div => Expr::Arithmetic(ArithOp::Div, lhs, rhs),
                BinaryOp::Mod => Expr::Arithmetic(ArithOp::Mod, lhs, rhs),
            }
        }
        Expression::In(needle, haystack) => Expr::In(
            Box::new(bind_expr(needle)?),
            haystack.iter().map(bind_expr).collect::<CResult<Vec<_>>>()?,
        ),
        Expression::IsNull(inner) => Expr::IsNull(Box::new(bind_expr(inner)?)),
        Expression::Like(lhs, rhs) => Expr::Like(Box::new(bind_expr(lhs)?), Box::new(bind_expr(rhs)?)),
        Expression::Function(name, args) => {
            Expr::Call(name.clone(), args.iter().map(bind_expr).collect::<CResult<Vec<_>>>()?)
        }
        Expression::Cast(inner, type_name) => {
            Expr::Call("CAST".into(), vec![bind_expr(inner)?, Expr::Literal(Value::Text(type_name.clone()))])
        }
        Expression::Array(items) => Expr::Array(items.iter().map(bind_expr).collect::<CResult<Vec<_>>>()?),
    })
}

thread_local! {
    // Assigns `?` parameters left-to-right within one `bind_expr` tree
    // walk. Reset per statement by `bind` via `reset_positional_counter`.
    static POSITIONAL_COUNTER: std::cell::Cell<usize> = std::cell::Cell::new(0);
}

/// Must be called once before binding a new statement, since positional
/// parameter indices are tracked in a thread-local counter rather than
/// threaded explicitly through every `bind_expr` call.
pub fn reset_positional_counter() {
    POSITIONAL_COUNTER.with(|c| c.set(0));
}
