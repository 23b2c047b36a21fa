pub mod mvcc;
mod scan;
mod transaction;

pub use mvcc::{Key, MVCC, MVCCDef, Status};
pub use scan::{Scan, ScanIterator};
pub use transaction::{Transaction, TransactionDef, TransactionState};

/// An MVCC version represents a logical timestamp. The latest version is incremented
/// when beginning each read-write transaction.
type Version = u64;
