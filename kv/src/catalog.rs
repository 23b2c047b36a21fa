//! Persistent, transactional schema metadata (§4.3, §1.6): tables,
//! columns, indexes, and sequences, stored as rows in reserved namespaces
//! and loaded/mutated under the same transaction rules as user data.
//!
//! Namespace 1 holds sequence rows, namespace 2 holds catalog entries,
//! and user objects receive namespaces >= 101 from the reserved
//! `__store_seq` sequence. Grounded on the teacher's `mvcc`/`encoding`
//! pairing: catalog rows use `encoding::keycode` for their own keys (a
//! `(kind-tag, name)` tuple) the same way `mvcc::Key` does for its
//! internal bookkeeping.

use crate::encoding::{SortDirection, Value};
use crate::error::{CResult, Error};
use crate::expr::Expr;
use crate::mvcc::Transaction;
use crate::storage::engine::Engine;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NAMESPACE_SEQUENCE: u64 = 1;
pub const NAMESPACE_CATALOG: u64 = 2;
pub const FIRST_USER_NAMESPACE: u64 = 101;
const SEQUENCE_NAME_STORE: &str = "__store_seq";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<Expr>,
    pub primary_key: bool,
    pub unique: bool,
    pub check: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub namespace: u64,
    pub columns: Vec<Column>,
    pub sql: String,
}

impl Table {
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns.iter().filter(|c| c.primary_key).map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub directions: Vec<SortDirection>,
    pub unique: bool,
    pub namespace: u64,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub value: i64,
    pub start: i64,
    pub increment: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub cycle: bool,
    pub cache: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum CatalogEntry {
    Table(Table),
    Index(Index),
}

/// A row key within the catalog namespace: `(kind discriminant, name)`.
/// `encoding::keycode`'s enum-variant tagging gives tables and indexes
/// disjoint key ranges automatically.
#[derive(Serialize, Deserialize)]
enum CatalogKey {
    Table(String),
    Index(String),
}

#[derive(Serialize, Deserialize)]
struct SequenceKey(String);

/// The in-memory catalog view: a snapshot of namespace 2 (schema) and
/// namespace 1 (sequence values) as of the transaction it was loaded in.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, Table>,
    indexes: HashMap<String, Index>,
    sequences: HashMap<String, Sequence>,
}

impl Catalog {
    /// Scans namespace 2 and namespace 1 inside `txn` and reconstructs the
    /// in-memory view (§4.3 "Loader").
    pub fn load<E: Engine>(txn: &Transaction<E>) -> CResult<Self> {
        let mut catalog = Catalog::default();

        let prefix = crate::encoding::Key::new(vec![]).encode(NAMESPACE_CATALOG, &[]);
        let mut scan = txn.scan_prefix(&prefix)?;
        let mut iter = scan.iter();
        while let Some(item) = iter.next() {
            let (_, value) = item?;
            match bincode::deserialize(&value)? {
                CatalogEntry::Table(t) => {
                    catalog.tables.insert(t.name.clone(), t);
                }
                CatalogEntry::Index(i) => {
                    catalog.indexes.insert(i.name.clone(), i);
                }
            }
        }
        drop(iter);
        drop(scan);

        let prefix = crate::encoding::Key::new(vec![]).encode(NAMESPACE_SEQUENCE, &[]);
        let mut scan = txn.scan_prefix(&prefix)?;
        let mut iter = scan.iter();
        while let Some(item) = iter.next() {
            let (_, value) = item?;
            let seq: Sequence = bincode::deserialize(&value)?;
            catalog.sequences.insert(seq.name.clone(), seq);
        }
        drop(iter);
        drop(scan);

        if !catalog.sequences.contains_key(SEQUENCE_NAME_STORE) {
            catalog.sequences.insert(
                SEQUENCE_NAME_STORE.to_string(),
                Sequence {
                    name: SEQUENCE_NAME_STORE.to_string(),
                    value: FIRST_USER_NAMESPACE as i64 - 1,
                    start: FIRST_USER_NAMESPACE as i64,
                    increment: 1,
                    min: None,
                    max: None,
                    cycle: false,
                    cache: 0,
                },
            );
        }

        Ok(catalog)
    }

    pub fn table(&self, name: &str) -> CResult<&Table> {
        self.tables.get(name).ok_or_else(|| Error::CatalogNotFound(format!("table {name}")))
    }

    pub fn index(&self, name: &str) -> CResult<&Index> {
        self.indexes.get(name).ok_or_else(|| Error::CatalogNotFound(format!("index {name}")))
    }

    pub fn sequence(&self, name: &str) -> CResult<&Sequence> {
        self.sequences.get(name).ok_or_else(|| Error::CatalogNotFound(format!("sequence {name}")))
    }

    pub fn indexes_on(&self, table: &str) -> Vec<&Index> {
        self.indexes.values().filter(|i| i.table == table).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Allocates the next namespace from `__store_seq` inside `txn`.
    fn next_namespace<E: Engine>(&mut self, txn: &Transaction<E>) -> CResult<u64> {
        let namespace = self.advance_sequence(txn, SEQUENCE_NAME_STORE)?;
        Ok(namespace as u64)
    }

    fn advance_sequence<E: Engine>(&mut self, txn: &Transaction<E>, name: &str) -> CResult<i64> {
        let seq = self
            .sequences
            .get_mut(name)
            .ok_or_else(|| Error::CatalogNotFound(format!("sequence {name}")))?;
        let mut next = seq.value + seq.increment;
        if let Some(max) = seq.max {
            if next > max {
                if seq.cycle {
                    next = seq.min.unwrap_or(seq.start);
                } else {
                    return Err(Error::Constraint(format!("sequence {name} exhausted")));
                }
            }
        }
        seq.value = next;
        let key = crate::encoding::keycode::serialize(&SequenceKey(name.to_string()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_SEQUENCE, &[]);
        txn.set(&key, bincode::serialize(seq)?)?;
        Ok(next)
    }

    fn put_table<E: Engine>(&self, txn: &Transaction<E>, table: &Table) -> CResult<()> {
        let key = crate::encoding::keycode::serialize(&CatalogKey::Table(table.name.clone()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_CATALOG, &[]);
        txn.set(&key, bincode::serialize(&CatalogEntry::Table(table.clone()))?)
    }

    fn put_index<E: Engine>(&self, txn: &Transaction<E>, index: &Index) -> CResult<()> {
        let key = crate::encoding::keycode::serialize(&CatalogKey::Index(index.name.clone()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_CATALOG, &[]);
        txn.set(&key, bincode::serialize(&CatalogEntry::Index(index.clone()))?)
    }

    /// Creates a table: validates PK columns exist, allocates a namespace,
    /// writes its catalog row, and registers it in the in-memory view.
    pub fn create_table<E: Engine>(
        &mut self,
        txn: &Transaction<E>,
        name: String,
        columns: Vec<Column>,
        sql: String,
    ) -> CResult<()> {
        if self.tables.contains_key(&name) {
            return Err(Error::CatalogDuplicate(format!("table {name}")));
        }
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Constraint(format!("duplicate column {}", column.name)));
            }
        }
        let namespace = self.next_namespace(txn)?;
        let unique_columns: Vec<String> =
            columns.iter().filter(|c| c.unique && !c.primary_key).map(|c| c.name.clone()).collect();
        let table = Table { name: name.clone(), namespace, columns, sql };
        self.put_table(txn, &table)?;
        self.tables.insert(name.clone(), table);
        for column in unique_columns {
            let index_name = format!("__unique_{name}_{column}");
            self.create_index(
                txn,
                index_name,
                name.clone(),
                vec![column],
                vec![SortDirection::Asc],
                true,
                String::new(),
            )?;
        }
        Ok(())
    }

    /// Drops a table: removes its catalog row and truncates its data
    /// namespace, within the same transaction.
    pub fn drop_table<E: Engine>(&mut self, txn: &Transaction<E>, name: &str) -> CResult<()> {
        let table = self.table(name)?.clone();
        let key = crate::encoding::keycode::serialize(&CatalogKey::Table(name.to_string()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_CATALOG, &[]);
        txn.delete(&key)?;
        let tree = crate::tree::Tree::new(txn, table.namespace, vec![]);
        tree.truncate()?;
        for index in self.indexes_on(name).iter().map(|i| i.name.clone()).collect::<Vec<_>>() {
            self.drop_index(txn, &index)?;
        }
        self.tables.remove(name);
        Ok(())
    }

    /// Creates an index: validates its columns exist on the owning table,
    /// allocates a namespace, writes its catalog row.
    pub fn create_index<E: Engine>(
        &mut self,
        txn: &Transaction<E>,
        name: String,
        table: String,
        columns: Vec<String>,
        directions: Vec<SortDirection>,
        unique: bool,
        sql: String,
    ) -> CResult<()> {
        if self.indexes.contains_key(&name) {
            return Err(Error::CatalogDuplicate(format!("index {name}")));
        }
        let owning = self.table(&table)?;
        for column in &columns {
            if owning.column(column).is_none() {
                return Err(Error::Constraint(format!("unknown column {column} on table {table}")));
            }
        }
        let namespace = self.next_namespace(txn)?;
        let index = Index { name: name.clone(), table, columns, directions, unique, namespace, sql };
        self.put_index(txn, &index)?;
        self.indexes.insert(name, index);
        Ok(())
    }

    pub fn drop_index<E: Engine>(&mut self, txn: &Transaction<E>, name: &str) -> CResult<()> {
        let index = self.index(name)?.clone();
        let key = crate::encoding::keycode::serialize(&CatalogKey::Index(name.to_string()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_CATALOG, &[]);
        txn.delete(&key)?;
        let tree = crate::tree::Tree::new(txn, index.namespace, vec![]);
        tree.truncate()?;
        self.indexes.remove(name);
        Ok(())
    }

    /// Creates a sequence; `min <= start <= max` if both bounds are set,
    /// and `cycle` requires both bounds (§4.3 invariants).
    pub fn create_sequence<E: Engine>(
        &mut self,
        txn: &Transaction<E>,
        name: String,
        start: i64,
        increment: i64,
        min: Option<i64>,
        max: Option<i64>,
        cycle: bool,
        cache: i64,
    ) -> CResult<()> {
        if self.sequences.contains_key(&name) {
            return Err(Error::CatalogDuplicate(format!("sequence {name}")));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if !(min <= start && start <= max) {
                return Err(Error::Constraint("sequence bounds must satisfy min <= start <= max".into()));
            }
        }
        if cycle && (min.is_none() || max.is_none()) {
            return Err(Error::Constraint("cycling sequence requires both min and max".into()));
        }
        let seq = Sequence { name: name.clone(), value: start, start, increment, min, max, cycle, cache };
        let key = crate::encoding::keycode::serialize(&SequenceKey(name.clone()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_SEQUENCE, &[]);
        txn.set(&key, bincode::serialize(&seq)?)?;
        self.sequences.insert(name, seq);
        Ok(())
    }

    pub fn drop_sequence<E: Engine>(&mut self, txn: &Transaction<E>, name: &str) -> CResult<()> {
        self.sequence(name)?;
        let key = crate::encoding::keycode::serialize(&SequenceKey(name.to_string()))?;
        let key = crate::encoding::Key::new(vec![Value::Blob(key)]).encode(NAMESPACE_SEQUENCE, &[]);
        txn.delete(&key)?;
        self.sequences.remove(name);
        Ok(())
    }

    /// Advances a user-visible sequence and returns its new value.
    pub fn next_sequence_value<E: Engine>(&mut self, txn: &Transaction<E>, name: &str) -> CResult<i64> {
        self.advance_sequence(txn, name)
    }
}
