use std::collections::Bound;
use std::sync::MutexGuard;

use crate::error::CResult;
use crate::mvcc::mvcc::Key;
use crate::mvcc::transaction::TransactionState;
use crate::mvcc::Version;
use crate::storage::engine::Engine;

/// A scan result. Can produce an iterator or collect an owned Vec.
///
/// This intermediate struct is unfortunately needed to hold the MutexGuard for the scan() caller,
/// since placing it in ScanIterator along with the inner iterator borrowing from it would create a self-referential struct.
pub struct Scan<'a, E: Engine + 'a> {
    /// Access to the locked engine.
    engine: MutexGuard<'a, E>,

    /// The transaction state.
    txn: &'a TransactionState,

    /// The scan type and parameter.
    param: ScanType,
}

enum ScanType {
    Range((Bound<Vec<u8>>, Bound<Vec<u8>>)),
    Prefix(Vec<u8>),
}

impl<'a, E: Engine + 'a> Scan<'a, E> {
    pub(crate) fn new(
        engine: MutexGuard<'a, E>,
        txn: &'a TransactionState,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> Self {
        Self { engine, txn, param: ScanType::Range((start, end)) }
    }

    /// Creates a new prefix scan.
    #[allow(dead_code)]
    pub(crate) fn new_prefix(engine: MutexGuard<'a, E>, txn: &'a TransactionState, prefix: Vec<u8>) -> Self {
        Self { engine, txn, param: ScanType::Prefix(prefix) }
    }

    /// Runs the scan, consuming self and returning a live iterator over it.
    /// Only one of this or `into_iter` is meaningful; we provide an
    /// iterator directly since the engine only exposes one at a time.
    pub fn iter(&mut self) -> ScanIterator<'_, E> {
        let inner = match &self.param {
            ScanType::Range((start, end)) => self.engine.scan((start.clone(), end.clone())),
            ScanType::Prefix(prefix) => self.engine.scan_prefix(prefix),
        };
        ScanIterator::new(self.txn, inner)
    }
}

/// An iterator over the latest live and visible key/value pairs at the txn
/// version.
pub struct ScanIterator<'a, E: Engine + 'a> {
    /// Decodes and filters visible MVCC versions from the inner engine iterator.
    inner: std::iter::Peekable<VersionIterator<'a, E>>,

    last: Option<Vec<u8>>,
}

impl<'a, E: Engine + 'a> ScanIterator<'a, E> {
    fn new(txn: &'a TransactionState, inner: E::ScanIterator<'a>) -> Self {
        Self { inner: VersionIterator::new(txn, inner).peekable(), last: None }
    }

    /// Fallible next(), emitting the next item, or None if exhausted.
    fn try_next(&mut self) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let Some(item) = self.inner.next() else { return Ok(None) };
            let (key, _, value) = item?;
            // Multiple versions of the same key may appear in ascending
            // version order; only the last (highest visible) one matters.
            if self.inner.peek().map(|n| matches!(n, Ok((k, _, _)) if k == &key)).unwrap_or(false) {
                continue;
            }
            if self.last.as_ref() == Some(&key) {
                continue;
            }
            self.last = Some(key.clone());
            match value {
                Some(v) => return Ok(Some((key, v))),
                None => continue, // tombstone
            }
        }
    }

    /// Fallible next_back(), emitting the next item from the back, or None if exhausted.
    fn try_next_back(&mut self) -> CResult<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            let Some(item) = self.inner.next_back() else { return Ok(None) };
            let (key, _, value) = item?;
            if self.last.as_ref() == Some(&key) {
                continue;
            }
            self.last = Some(key.clone());
            match value {
                Some(v) => return Ok(Some((key, v))),
                None => continue,
            }
        }
    }
}

impl<'a, E: Engine> Iterator for ScanIterator<'a, E> {
    type Item = CResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl<'a, E: Engine> DoubleEndedIterator for ScanIterator<'a, E> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.try_next_back().transpose()
    }
}

/// An iterator that decodes raw engine key/value pairs into MVCC key/value versions, and skips invisible versions. Helper for ScanIterator.
struct VersionIterator<'a, E: Engine + 'a> {
    /// The transaction the scan is running in.
    txn: &'a TransactionState,

    /// The inner engine scan iterator.
    inner: E::ScanIterator<'a>,
}

impl<'a, E: Engine> VersionIterator<'a, E> {
    fn new(txn: &'a TransactionState, inner: E::ScanIterator<'a>) -> Self {
        Self { txn, inner }
    }

    fn decode(raw_key: Vec<u8>, raw_value: Vec<u8>) -> CResult<(Vec<u8>, Version, Option<Vec<u8>>)> {
        match Key::decode(&raw_key)? {
            Key::Version(key, version) => {
                let value: Option<Vec<u8>> = bincode::deserialize(&raw_value)?;
                Ok((key.into_owned(), version, value))
            }
            _ => Err(crate::error::Error::Internal("expected Version key".into())),
        }
    }

    /// Fallible next(), emitting the next item, or None if exhausted.
    fn try_next(&mut self) -> CResult<Option<(Vec<u8>, Version, Option<Vec<u8>>)>> {
        loop {
            let Some(item) = self.inner.next() else { return Ok(None) };
            let (raw_key, raw_value) = item?;
            let (key, version, value) = Self::decode(raw_key, raw_value)?;
            if !self.txn.is_visible(version) {
                continue;
            }
            return Ok(Some((key, version, value)));
        }
    }

    /// Fallible next_back(), emitting the previous item, or None if exhausted.
    fn try_next_back(&mut self) -> CResult<Option<(Vec<u8>, Version, Option<Vec<u8>>)>> {
        loop {
            let Some(item) = self.inner.next_back() else { return Ok(None) };
            let (raw_key, raw_value) = item?;
            let (key, version, value) = Self::decode(raw_key, raw_value)?;
            if !self.txn.is_visible(version) {
                continue;
            }
            return Ok(Some((key, version, value)));
        }
    }
}

impl<'a, E: Engine> Iterator for VersionIterator<'a, E> {
    type Item = CResult<(Vec<u8>, Version, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl<'a, E: Engine> DoubleEndedIterator for VersionIterator<'a, E> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.try_next_back().transpose()
    }
}
