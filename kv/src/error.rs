//! Error kinds shared by every layer of the engine (encoding, storage, mvcc,
//! catalog, expressions, planner, and the transaction/connection layer).
//!
//! Each variant corresponds to a row of the error-kind table: callers can
//! match on the kind to decide whether a retry, a corrected statement, or a
//! bug report is appropriate. [Author fengyang]

use std::fmt;

pub type CResult<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// SQL text failed to tokenize or parse.
    Parse(String),
    /// A named catalog object (table, index, sequence, column) does not exist.
    CatalogNotFound(String),
    /// A named catalog object already exists.
    CatalogDuplicate(String),
    /// A row failed a uniqueness, not-null, check, or type constraint.
    Constraint(String),
    /// An expression could not be evaluated against its environment.
    Evaluation(String),
    /// A point lookup found nothing. Distinct from `Backend` so callers can
    /// treat it as an expected outcome rather than a failure.
    NotFound(String),
    /// A write was attempted against a read-only transaction.
    ReadOnly,
    /// The query context's cancellation token fired.
    Cancelled,
    /// The underlying KV backend returned an error (I/O, lock contention).
    Backend(String),
    /// The planner, executor, or catalog hit a state it should never be
    /// able to reach. Always a bug, never a caller mistake.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::CatalogNotFound(msg) => write!(f, "not found: {}", msg),
            Error::CatalogDuplicate(msg) => write!(f, "already exists: {}", msg),
            Error::Constraint(msg) => write!(f, "constraint violation: {}", msg),
            Error::Evaluation(msg) => write!(f, "evaluation error: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::ReadOnly => write!(f, "cannot write in a read-only transaction"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Backend(msg) => write!(f, "storage error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(err: std::num::TryFromIntError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty_for_every_kind() {
        let kinds = vec![
            Error::Parse("x".into()),
            Error::CatalogNotFound("t".into()),
            Error::CatalogDuplicate("t".into()),
            Error::Constraint("c".into()),
            Error::Evaluation("e".into()),
            Error::NotFound("k".into()),
            Error::ReadOnly,
            Error::Cancelled,
            Error::Backend("io".into()),
            Error::Internal("bug".into()),
        ];
        for kind in kinds {
            assert!(!kind.to_string().is_empty());
        }
    }
}
