//! Expression trees and their evaluation environment (§4.4, §1.8).
//! Grounded on `types::{truthy, compare_values}` for the comparison and
//! truthiness rules, and on the teacher's habit (`mvcc::Transaction`,
//! `catalog::Catalog`) of passing a transaction + catalog view as shared,
//! borrowed context rather than cloning state into every evaluator.

use crate::encoding::Value;
use crate::error::{CResult, Error};
use crate::types::{compare_values, truthy, Row};
use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Derives `Serialize`/`Deserialize` so a bound `Expr` can be stored
/// directly in `catalog::Column` (DEFAULT/CHECK), not just its SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Parameter(Parameter),
    Column(String),
    Comparison(CompareOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arithmetic(ArithOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
    IsNull(Box<Expr>),
    Like(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameter {
    Positional(usize),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Bound parameter values: either positional (`?`, bound left to right) or
/// named (`$name`). §6: the two forms are mutually exclusive per statement,
/// enforced by the SQL front end, not here.
#[derive(Debug, Clone, Default)]
pub enum Parameters {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

/// A scope stack entry: the current row (if any) plus a correlated
/// back-link to the enclosing scope, for subquery evaluation.
pub struct Environment<'a> {
    row: Option<&'a Row>,
    parameters: &'a Parameters,
    parent: Option<&'a Environment<'a>>,
}

impl<'a> Environment<'a> {
    pub fn new(parameters: &'a Parameters) -> Self {
        Environment { row: None, parameters, parent: None }
    }

    pub fn with_row(parameters: &'a Parameters, row: &'a Row) -> Self {
        Environment { row: Some(row), parameters, parent: None }
    }

    pub fn nested(&'a self, row: &'a Row) -> Self {
        Environment { row: Some(row), parameters: self.parameters, parent: Some(self) }
    }

    fn lookup_column(&self, name: &str) -> CResult<Value> {
        if let Some(row) = self.row {
            if let Some(value) = row.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(parent) = self.parent {
            return parent.lookup_column(name);
        }
        Err(Error::Evaluation(format!("unknown column {name}")))
    }

    fn lookup_parameter(&self, parameter: &Parameter) -> CResult<Value> {
        match (parameter, self.parameters) {
            (Parameter::Positional(i), Parameters::Positional(values)) => values
                .get(*i)
                .cloned()
                .ok_or_else(|| Error::Evaluation(format!("missing parameter ?{}", i + 1))),
            (Parameter::Named(name), Parameters::Named(values)) => values
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Evaluation(format!("missing parameter ${name}"))),
            _ => Err(Error::Evaluation("parameter kind does not match bound parameters".into())),
        }
    }
}

impl Expr {
    pub fn evaluate(&self, env: &Environment) -> CResult<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Parameter(p) => env.lookup_parameter(p),
            Expr::Column(name) => env.lookup_column(name),
            Expr::Not(inner) => Ok(Value::Boolean(!truthy(&inner.evaluate(env)?))),
            Expr::IsNull(inner) => Ok(Value::Boolean(inner.evaluate(env)?.is_null())),
            Expr::Logical(op, lhs, rhs) => {
                let l = truthy(&lhs.evaluate(env)?);
                match op {
                    LogicalOp::And if !l => Ok(Value::Boolean(false)),
                    LogicalOp::Or if l => Ok(Value::Boolean(true)),
                    _ => Ok(Value::Boolean(truthy(&rhs.evaluate(env)?))),
                }
            }
            Expr::Comparison(op, lhs, rhs) => {
                let l = lhs.evaluate(env)?;
                let r = rhs.evaluate(env)?;
                Ok(Value::Boolean(evaluate_comparison(*op, &l, &r)))
            }
            Expr::Arithmetic(op, lhs, rhs) => {
                evaluate_arithmetic(*op, &lhs.evaluate(env)?, &rhs.evaluate(env)?)
            }
            Expr::In(needle, haystack) => {
                let needle = needle.evaluate(env)?;
                for candidate in haystack {
                    if evaluate_comparison(CompareOp::Eq, &needle, &candidate.evaluate(env)?) {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Expr::Like(value, pattern) => {
                let value = value.evaluate(env)?;
                let pattern = pattern.evaluate(env)?;
                match (value, pattern) {
                    (Value::Text(v), Value::Text(p)) => Ok(Value::Boolean(like_match(&v, &p))),
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    _ => Err(Error::Evaluation("LIKE requires text operands".into())),
                }
            }
            Expr::Call(name, args) => evaluate_call(name, args, env),
            Expr::Array(items) => {
                let values = items.iter().map(|e| e.evaluate(env)).collect::<CResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Expr::Object(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, expr) in fields {
                    values.push((name.clone(), expr.evaluate(env)?));
                }
                Ok(Value::Object(values))
            }
        }
    }

    /// Whether evaluating this expression touches no column reference, so
    /// it can be folded to a literal once (used by the planner's constant
    /// folding and precalculation rules).
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Parameter(_) => true,
            Expr::Column(_) => false,
            Expr::Not(e) | Expr::IsNull(e) => e.is_constant(),
            Expr::Comparison(_, l, r) | Expr::Logical(_, l, r) | Expr::Arithmetic(_, l, r) => {
                l.is_constant() && r.is_constant()
            }
            Expr::In(needle, haystack) => {
                needle.is_constant() && haystack.iter().all(Expr::is_constant)
            }
            Expr::Like(v, p) => v.is_constant() && p.is_constant(),
            Expr::Call(_, args) => args.iter().all(Expr::is_constant),
            Expr::Array(items) => items.iter().all(Expr::is_constant),
            Expr::Object(fields) => fields.iter().all(|(_, e)| e.is_constant()),
        }
    }
}

fn evaluate_comparison(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    // "Null compares equal to null, otherwise null -> not truthy" (§4.4):
    // equality treats two nulls as equal; every other comparison against
    // a null is simply false.
    if lhs.is_null() || rhs.is_null() {
        return op == CompareOp::Eq && lhs.is_null() && rhs.is_null();
    }
    let ordering = compare_values(lhs, rhs);
    match (op, ordering) {
        (CompareOp::Eq, Some(Ordering::Equal)) => true,
        (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
        (CompareOp::Ne, None) => true,
        (CompareOp::Lt, Some(Ordering::Less)) => true,
        (CompareOp::Le, Some(Ordering::Less | Ordering::Equal)) => true,
        (CompareOp::Gt, Some(Ordering::Greater)) => true,
        (CompareOp::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
        _ => false,
    }
}

fn evaluate_arithmetic(op: ArithOp, lhs: &Value, rhs: &Value) -> CResult<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div if *b != 0 => a.checked_div(*b),
                ArithOp::Mod if *b != 0 => a.checked_rem(*b),
                _ => return Err(Error::Evaluation("division or modulo by zero".into())),
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| Error::Evaluation("integer overflow".into()))
        }
        (a, b) => {
            let (a, b) = (as_f64(a)?, as_f64(b)?);
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            };
            Ok(Value::Float(result))
        }
    }
}

fn as_f64(value: &Value) -> CResult<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        _ => Err(Error::Evaluation(format!("expected a number, got {}", value.type_name()))),
    }
}

fn like_match(value: &str, pattern: &str) -> bool {
    // `%` matches any run of characters, `_` matches exactly one.
    fn recurse(v: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => v.is_empty(),
            Some(('%', rest)) => (0..=v.len()).any(|i| recurse(&v[i..], rest)),
            Some(('_', rest)) => !v.is_empty() && recurse(&v[1..], rest),
            Some((c, rest)) => v.first() == Some(c) && recurse(&v[1..], rest),
        }
    }
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    recurse(&v, &p)
}

fn evaluate_call(name: &str, args: &[Expr], env: &Environment) -> CResult<Value> {
    match name.to_ascii_uppercase().as_str() {
        "CAST" => {
            if args.len() != 2 {
                return Err(Error::Evaluation("CAST takes a value and a type name".into()));
            }
            let value = args[0].evaluate(env)?;
            let Value::Text(type_name) = args[1].evaluate(env)? else {
                return Err(Error::Evaluation("CAST target type must be a text literal".into()));
            };
            cast(&value, &type_name)
        }
        "LOWER" => match args[0].evaluate(env)? {
            Value::Text(s) => Ok(Value::Text(s.to_lowercase())),
            Value::Null => Ok(Value::Null),
            _ => Err(Error::Evaluation("LOWER requires text".into())),
        },
        "UPPER" => match args[0].evaluate(env)? {
            Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
            Value::Null => Ok(Value::Null),
            _ => Err(Error::Evaluation("UPPER requires text".into())),
        },
        "LENGTH" => match args[0].evaluate(env)? {
            Value::Text(s) => Ok(Value::Integer(s.chars().count() as i64)),
            Value::Blob(b) => Ok(Value::Integer(b.len() as i64)),
            Value::Null => Ok(Value::Null),
            _ => Err(Error::Evaluation("LENGTH requires text or blob".into())),
        },
        _ => Err(Error::Evaluation(format!("unknown function {name}"))),
    }
}

/// Exposed to `plan::Node::Validate` for column type-conversion; the only
/// other caller is `evaluate_call`'s `CAST` branch above.
pub(crate) fn cast(value: &Value, type_name: &str) -> CResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match type_name.to_ascii_uppercase().as_str() {
        "INTEGER" => match value {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Float(f) => Ok(Value::Integer(*f as i64)),
            Value::Text(s) => s
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| Error::Evaluation(format!("cannot cast '{s}' to integer"))),
            _ => Err(Error::Evaluation(format!("cannot cast {} to integer", value.type_name()))),
        },
        "FLOAT" | "DOUBLE" => match value {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Text(s) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| Error::Evaluation(format!("cannot cast '{s}' to float"))),
            _ => Err(Error::Evaluation(format!("cannot cast {} to float", value.type_name()))),
        },
        "TEXT" => Ok(Value::Text(match value {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Text(s) => s.clone(),
            other => return Err(Error::Evaluation(format!("cannot cast {} to text", other.type_name()))),
        })),
        other => Err(Error::Evaluation(format!("unknown cast target type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn row_with(values: Vec<(&str, Value)>) -> Row {
        let columns: Vec<String> = values.iter().map(|(n, _)| n.to_string()).collect();
        let values: Vec<Value> = values.into_iter().map(|(_, v)| v).collect();
        Row::new(Arc::from("t"), Arc::from(columns), values)
    }

    #[test]
    fn comparison_and_logical_short_circuit() {
        let params = Parameters::None;
        let env = Environment::new(&params);
        let expr = Expr::Logical(
            LogicalOp::And,
            Box::new(Expr::Literal(Value::Boolean(false))),
            Box::new(Expr::Call("LENGTH".into(), vec![])), // would error if evaluated
        );
        assert_eq!(expr.evaluate(&env).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn null_equals_null_but_nothing_else() {
        let params = Parameters::None;
        let env = Environment::new(&params);
        assert_eq!(
            evaluate_comparison(CompareOp::Eq, &Value::Null, &Value::Null),
            true
        );
        assert_eq!(
            Expr::Comparison(
                CompareOp::Lt,
                Box::new(Expr::Literal(Value::Null)),
                Box::new(Expr::Literal(Value::Integer(1)))
            )
            .evaluate(&env)
            .unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn column_lookup_reads_from_row_scope() {
        let params = Parameters::None;
        let row = row_with(vec![("id", Value::Integer(7))]);
        let env = Environment::with_row(&params, &row);
        assert_eq!(Expr::Column("id".into()).evaluate(&env).unwrap(), Value::Integer(7));
    }

    #[test]
    fn positional_parameters_bind_left_to_right() {
        let params = Parameters::Positional(vec![Value::Integer(1), Value::Integer(2)]);
        let env = Environment::new(&params);
        assert_eq!(Expr::Parameter(Parameter::Positional(1)).evaluate(&env).unwrap(), Value::Integer(2));
    }

    #[test]
    fn like_supports_percent_and_underscore() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "h_ll_"));
        assert!(!like_match("hello", "h_llo_"));
    }

    #[test]
    fn cast_text_to_integer() {
        assert_eq!(cast(&Value::Text("42".into()), "INTEGER").unwrap(), Value::Integer(42));
        assert!(cast(&Value::Text("nope".into()), "INTEGER").is_err());
    }

    #[test]
    fn arithmetic_promotes_to_float_on_mixed_types() {
        let params = Parameters::None;
        let env = Environment::new(&params);
        let expr = Expr::Arithmetic(
            ArithOp::Add,
            Box::new(Expr::Literal(Value::Integer(1))),
            Box::new(Expr::Literal(Value::Float(0.5))),
        );
        assert_eq!(expr.evaluate(&env).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn division_by_zero_errors_for_integers() {
        let params = Parameters::None;
        let env = Environment::new(&params);
        let expr = Expr::Arithmetic(
            ArithOp::Div,
            Box::new(Expr::Literal(Value::Integer(1))),
            Box::new(Expr::Literal(Value::Integer(0))),
        );
        assert!(expr.evaluate(&env).is_err());
    }
}
