//! The Tree facade (§4.2): a namespaced, typed view over the KV store that
//! the catalog and every table/index reader build on. Grounded on the
//! teacher's `mvcc::Transaction` scan/get/set/delete primitives, adding the
//! namespace + sort-order vector + range-to-seek-bytes translation that
//! `mvcc` itself has no notion of.

use crate::encoding::{self, Key, SortDirection, Value};
use crate::error::{CResult, Error};
use crate::mvcc::Transaction;
use crate::storage::engine::Engine;
use std::ops::Bound;

/// A range over composite keys: `None` bounds are open; `exclusive` governs
/// whether `max` (for ascending ranges) is included, matching the Range
/// semantics table in §4.2.
#[derive(Debug, Clone, Default)]
pub struct Range {
    pub min: Option<Key>,
    pub max: Option<Key>,
    pub exclusive: bool,
}

impl Range {
    pub fn all() -> Self {
        Range::default()
    }

    pub fn eq(key: Key) -> Self {
        Range { min: Some(key.clone()), max: Some(key), exclusive: false }
    }

    pub fn gt(key: Key) -> Self {
        Range { min: Some(key), max: None, exclusive: true }
    }

    pub fn ge(key: Key) -> Self {
        Range { min: Some(key), max: None, exclusive: false }
    }

    pub fn lt(key: Key) -> Self {
        Range { min: None, max: Some(key), exclusive: true }
    }

    pub fn le(key: Key) -> Self {
        Range { min: None, max: Some(key), exclusive: false }
    }
}

/// A namespaced, typed view over an `mvcc::Transaction`. `order` gives the
/// per-column sort direction used both to encode new keys and to translate
/// `Range`s into seek bytes.
pub struct Tree<'a, E: Engine> {
    txn: &'a Transaction<E>,
    namespace: u64,
    order: Vec<SortDirection>,
}

impl<'a, E: Engine> Tree<'a, E> {
    pub fn new(txn: &'a Transaction<E>, namespace: u64, order: Vec<SortDirection>) -> Self {
        Tree { txn, namespace, order }
    }

    fn encode_key(&self, key: &Key) -> Vec<u8> {
        key.encode(self.namespace, &self.order)
    }

    /// One byte past `bytes`: the smallest byte string strictly greater
    /// than every string with `bytes` as a prefix.
    fn just_past(bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out.push(0xff);
        out
    }

    pub fn put(&self, key: &Key, value_bytes: Vec<u8>) -> CResult<()> {
        self.txn.set(&self.encode_key(key), value_bytes)
    }

    /// Point lookup. Returns `Ok(None)` rather than an error on a miss:
    /// "not found" is an expected outcome here, not a backend failure.
    pub fn get(&self, key: &Key) -> CResult<Option<Vec<u8>>> {
        self.txn.get(&self.encode_key(key))
    }

    /// Idempotent: deleting a missing key is not an error.
    pub fn delete(&self, key: &Key) -> CResult<()> {
        self.txn.delete(&self.encode_key(key))
    }

    /// Deletes every entry in the namespace.
    pub fn truncate(&self) -> CResult<()> {
        let keys: Vec<Vec<u8>> = {
            let mut scan = self.txn.scan_prefix(&encoding::Key::new(vec![]).encode(self.namespace, &[]))?;
            let mut iter = scan.iter();
            let mut out = Vec::new();
            while let Some(item) = iter.next() {
                out.push(item?.0);
            }
            out
        };
        for key in keys {
            self.txn.delete(&key)?;
        }
        Ok(())
    }

    /// Translates `range` + `reversed` into seek/stop bytes per the §4.2
    /// matrix, then iterates, calling `f(key, value)` for each entry.
    /// `f` returning `Ok(false)` stops iteration early (the "sentinel").
    pub fn iterate_on_range(
        &self,
        range: &Range,
        reversed: bool,
        mut f: impl FnMut(Key, Vec<u8>) -> CResult<bool>,
    ) -> CResult<()> {
        let desc = self.order.first().copied().unwrap_or(SortDirection::Asc).is_desc();

        let min_bytes = range.min.as_ref().map(|k| self.encode_key(k));
        let max_bytes = range.max.as_ref().map(|k| self.encode_key(k));

        // The ASC/DESC × =/>/>=/</<= matrix from §4.2: forward iteration
        // walks encoded-byte order, which is reversed relative to logical
        // order on a DESC column, so the matrix's "Seek"/"End" bytes swap
        // roles with min/max accordingly.
        let (start, end) = if !desc {
            let start = match &min_bytes {
                Some(b) if range.exclusive && max_bytes.is_none() => Bound::Excluded(b.clone()),
                Some(b) => Bound::Included(b.clone()),
                None => Bound::Unbounded,
            };
            let end = match &max_bytes {
                Some(b) if range.exclusive && range.min.as_ref() == range.max.as_ref() => {
                    Bound::Included(b.clone())
                }
                Some(b) if range.exclusive => Bound::Excluded(b.clone()),
                Some(b) => Bound::Included(b.clone()),
                None => Bound::Unbounded,
            };
            (start, end)
        } else {
            // On a DESC column the encoded bytes run opposite to logical
            // order, so a logical "min" becomes the upper encoded bound.
            let start = match &max_bytes {
                Some(b) if range.exclusive && min_bytes.is_none() => Bound::Excluded(b.clone()),
                Some(b) => Bound::Included(b.clone()),
                None => Bound::Unbounded,
            };
            let end = match &min_bytes {
                Some(b) if range.exclusive => Bound::Excluded(Self::just_past(b)),
                Some(b) => Bound::Included(Self::just_past(b)),
                None => Bound::Unbounded,
            };
            (start, end)
        };

        let namespace_prefix = encoding::successor(self.namespace);
        let lower = match start {
            Bound::Included(b) => b,
            Bound::Excluded(b) => Self::just_past(&b),
            Bound::Unbounded => Key::new(vec![]).encode(self.namespace, &[]),
        };
        let upper = match end {
            Bound::Included(b) => Bound::Included(b),
            Bound::Excluded(b) => Bound::Excluded(b),
            Bound::Unbounded => Bound::Excluded(namespace_prefix),
        };

        let mut scan = self.txn.scan((Bound::Included(lower), upper))?;
        let mut iter = scan.iter();
        let mut collected = Vec::new();
        // mvcc::Scan only exposes a forward/backward DoubleEndedIterator;
        // reading fully and reversing in memory keeps Tree's contract
        // (an ordered callback walk) simple without duplicating mvcc's
        // version-filtering logic in a second code path.
        if reversed {
            while let Some(item) = iter.next_back() {
                collected.push(item?);
            }
        } else {
            while let Some(item) = iter.next() {
                collected.push(item?);
            }
        }
        for (raw_key, value) in collected {
            let (_, key) = Key::decode(&raw_key)?;
            if !f(key, value)? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvcc::{MVCCDef, MVCC};
    use crate::storage::memory::Memory;

    fn tree_for<'a, E: Engine>(txn: &'a Transaction<E>) -> Tree<'a, E> {
        Tree::new(txn, 101, vec![SortDirection::Asc])
    }

    #[test]
    fn put_get_delete_roundtrip() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let tree = tree_for(&txn);
        let key = Key::new(vec![Value::Integer(1)]);
        tree.put(&key, b"hello".to_vec())?;
        assert_eq!(tree.get(&key)?, Some(b"hello".to_vec()));
        tree.delete(&key)?;
        assert_eq!(tree.get(&key)?, None);
        // deleting again is not an error
        tree.delete(&key)?;
        Ok(())
    }

    #[test]
    fn iterate_on_range_visits_in_order() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let tree = tree_for(&txn);
        for i in 1..=5 {
            tree.put(&Key::new(vec![Value::Integer(i)]), vec![i as u8])?;
        }
        let mut seen = Vec::new();
        tree.iterate_on_range(&Range::all(), false, |key, _| {
            seen.push(key);
            Ok(true)
        })?;
        assert_eq!(seen.len(), 5);
        Ok(())
    }

    #[test]
    fn gt_range_excludes_the_bound_itself() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let tree = tree_for(&txn);
        for i in 1..=5 {
            tree.put(&Key::new(vec![Value::Integer(i)]), vec![i as u8])?;
        }
        let mut seen = Vec::new();
        tree.iterate_on_range(&Range::gt(Key::new(vec![Value::Integer(3)])), false, |key, _| {
            seen.push(key);
            Ok(true)
        })?;
        assert_eq!(seen.len(), 2, "x > 3 should only match 4 and 5, not 3 itself");
        Ok(())
    }

    #[test]
    fn lt_range_on_desc_column_excludes_the_bound_itself() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let txn_tree = Tree::new(&txn, 101, vec![SortDirection::Desc]);
        for i in 1..=5 {
            txn_tree.put(&Key::new(vec![Value::Integer(i)]), vec![i as u8])?;
        }
        let mut seen = Vec::new();
        txn_tree.iterate_on_range(&Range::lt(Key::new(vec![Value::Integer(3)])), false, |key, _| {
            seen.push(key);
            Ok(true)
        })?;
        assert_eq!(seen.len(), 2, "x < 3 should only match 1 and 2, not 3 itself");
        Ok(())
    }

    #[test]
    fn iterate_on_range_early_termination() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let tree = tree_for(&txn);
        for i in 1..=5 {
            tree.put(&Key::new(vec![Value::Integer(i)]), vec![i as u8])?;
        }
        let mut seen = 0;
        tree.iterate_on_range(&Range::all(), false, |_, _| {
            seen += 1;
            Ok(seen < 2)
        })?;
        assert_eq!(seen, 2);
        Ok(())
    }

    #[test]
    fn truncate_removes_every_entry() -> CResult<()> {
        let mvcc = MVCC::new(Memory::new());
        let txn = mvcc.begin()?;
        let tree = tree_for(&txn);
        tree.put(&Key::new(vec![Value::Integer(1)]), vec![1])?;
        tree.put(&Key::new(vec![Value::Integer(2)]), vec![2])?;
        tree.truncate()?;
        let mut seen = 0;
        tree.iterate_on_range(&Range::all(), false, |_, _| {
            seen += 1;
            Ok(true)
        })?;
        assert_eq!(seen, 0);
        Ok(())
    }
}
