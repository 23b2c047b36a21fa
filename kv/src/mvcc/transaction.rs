use std::collections::HashSet;
use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, Mutex};

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::mvcc::mvcc::{Key, KeyPrefix};
use crate::mvcc::scan::Scan;
use crate::mvcc::Version;
use crate::storage::engine::Engine;

/// An MVCC transaction.
pub struct Transaction<E: Engine> {
    /// The underlying engine, shared by all transactions.
    engine: Arc<Mutex<E>>,

    /// The transaction state.
    st: TransactionState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionState {
    /// The version this transaction is running at.
    /// Only one read-write transaction can run at a given version, since this identifies its writes.
    pub version: Version,

    /// If true, the transaction is read only.
    pub read_only: bool,

    /// The set of concurrent active (uncommitted) transactions, as of the start of this transaction.
    /// Their writes should be invisible to this transaction even if they're writing at a lower version,
    /// since they're not committed yet.
    pub active: HashSet<Version>,
}

impl TransactionState {
    /// Returns whether a version is visible to this transaction: it must be
    /// at or before our own version, and must not belong to a transaction
    /// that was still active when we took our snapshot.
    pub(crate) fn is_visible(&self, version: Version) -> bool {
        if self.active.contains(&version) {
            false
        } else {
            version <= self.version
        }
    }
}

pub(crate) trait TransactionDef<E: Engine> {
    fn begin(engine: Arc<Mutex<E>>) -> CResult<Transaction<E>>;

    fn begin_read_only(engine: Arc<Mutex<E>>, as_of: Option<Version>) -> CResult<Transaction<E>>;

    fn resume(engine: Arc<Mutex<E>>, state: TransactionState) -> CResult<Transaction<E>>;
}

fn lock<E: Engine>(engine: &Arc<Mutex<E>>) -> CResult<std::sync::MutexGuard<'_, E>> {
    engine.lock().map_err(|e| Error::Internal(e.to_string()))
}

/// Fetches the next available version, and advances it for the next caller.
fn fetch_next_version<E: Engine>(session: &mut E) -> CResult<Version> {
    let version = match session.get(&Key::NextVersion.encode()?)? {
        Some(ref v) => bincode::deserialize(v)?,
        None => 1,
    };
    session.set(&Key::NextVersion.encode()?, bincode::serialize(&(version + 1))?)?;
    Ok(version)
}

/// Scans the set of currently active (uncommitted) transactions.
fn scan_active<E: Engine>(session: &mut E) -> CResult<HashSet<Version>> {
    let mut active = HashSet::new();
    let mut scan = session.scan_prefix(&KeyPrefix::TxnActive.encode()?);
    while let Some(item) = scan.next() {
        let (key, _) = item?;
        match Key::decode(&key)? {
            Key::TxnActive(version) => {
                active.insert(version);
            }
            _ => return Err(Error::Internal("expected TxnActive key".into())),
        }
    }
    Ok(active)
}

impl<E: Engine> TransactionDef<E> for Transaction<E> {
    fn begin(engine: Arc<Mutex<E>>) -> CResult<Transaction<E>> {
        let mut session = lock(&engine)?;
        let version = fetch_next_version(&mut session)?;
        let active = scan_active(&mut session)?;
        if !active.is_empty() {
            session.set(&Key::TxnActiveSnapshot(version).encode()?, bincode::serialize(&active)?)?;
        }
        session.set(&Key::TxnActive(version).encode()?, vec![])?;
        drop(session);
        Ok(Transaction { engine, st: TransactionState { version, read_only: false, active } })
    }

    fn begin_read_only(engine: Arc<Mutex<E>>, as_of: Option<Version>) -> CResult<Transaction<E>> {
        let mut session = lock(&engine)?;
        let mut version = fetch_next_version(&mut session)?;
        let mut active = HashSet::new();
        if let Some(as_of) = as_of {
            version = as_of;
            if let Some(ref v) = session.get(&Key::TxnActiveSnapshot(version).encode()?)? {
                active = bincode::deserialize(v)?;
            }
        } else {
            active = scan_active(&mut session)?;
        }
        drop(session);
        Ok(Transaction { engine, st: TransactionState { version, read_only: true, active } })
    }

    fn resume(engine: Arc<Mutex<E>>, state: TransactionState) -> CResult<Transaction<E>> {
        Ok(Transaction { engine, st: state })
    }
}

impl<E: Engine> Transaction<E> {
    pub fn version(&self) -> Version {
        self.st.version
    }

    pub fn read_only(&self) -> bool {
        self.st.read_only
    }

    pub fn state(&self) -> &TransactionState {
        &self.st
    }

    /// Commits the transaction, making its writes visible to future transactions.
    pub fn commit(self) -> CResult<()> {
        if self.st.read_only {
            return Ok(());
        }
        let mut session = lock(&self.engine)?;
        let remove: Vec<Vec<u8>> = {
            let mut scan = session.scan_prefix(&KeyPrefix::TxnWrite(self.st.version).encode()?);
            let mut keys = Vec::new();
            while let Some(item) = scan.next() {
                keys.push(item?.0);
            }
            keys
        };
        for key in remove {
            session.delete(&key)?;
        }
        session.delete(&Key::TxnActive(self.st.version).encode()?)?;
        Ok(())
    }

    /// Rolls back the transaction, discarding all of its writes.
    pub fn rollback(self) -> CResult<()> {
        if self.st.read_only {
            return Ok(());
        }
        let mut session = lock(&self.engine)?;
        let writes: Vec<(Vec<u8>, Vec<u8>)> = {
            let mut scan = session.scan_prefix(&KeyPrefix::TxnWrite(self.st.version).encode()?);
            let mut items = Vec::new();
            while let Some(item) = scan.next() {
                items.push(item?);
            }
            items
        };
        for (write_key, _) in writes {
            let key = match Key::decode(&write_key)? {
                Key::TxnWrite(_, key) => key.into_owned(),
                _ => return Err(Error::Internal("expected TxnWrite key".into())),
            };
            session.delete(&Key::Version(key.into(), self.st.version).encode()?)?;
            session.delete(&write_key)?;
        }
        session.delete(&Key::TxnActive(self.st.version).encode()?)?;
        Ok(())
    }

    /// Writes a value for a key, checking for write conflicts with concurrent transactions.
    pub fn set(&self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.write(key, Some(value))
    }

    /// Deletes a key, checking for write conflicts.
    pub fn delete(&self, key: &[u8]) -> CResult<()> {
        self.write(key, None)
    }

    fn write(&self, key: &[u8], value: Option<Vec<u8>>) -> CResult<()> {
        if self.st.read_only {
            return Err(Error::ReadOnly);
        }
        let mut session = lock(&self.engine)?;

        // Check for a conflicting write: any version of this key beyond our
        // own that is invisible to us means a concurrent transaction beat us
        // to it, and we must retry.
        let from = Key::Version(
            key.into(),
            self.st.active.iter().min().copied().unwrap_or(self.st.version + 1),
        )
        .encode()?;
        let to = Key::Version(key.into(), u64::MAX).encode()?;
        if let Some(item) = session.scan(from..=to).last() {
            let (raw_key, _) = item?;
            match Key::decode(&raw_key)? {
                Key::Version(_, version) => {
                    if !self.st.is_visible(version) {
                        return Err(Error::Internal(
                            "serialization failure: concurrent write conflict, retry transaction".into(),
                        ));
                    }
                }
                _ => return Err(Error::Internal("expected Version key".into())),
            }
        }

        session.set(
            &Key::TxnWrite(self.st.version, key.into()).encode()?,
            vec![],
        )?;
        session.set(
            &Key::Version(key.into(), self.st.version).encode()?,
            bincode::serialize(&value)?,
        )?;
        Ok(())
    }

    /// Fetches a key's value, if any, as of this transaction's snapshot.
    pub fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        let mut session = lock(&self.engine)?;
        let from = Key::Version(key.into(), 0).encode()?;
        let to = Key::Version(key.into(), self.st.version).encode()?;
        let mut scan = session.scan(from..=to);
        while let Some(item) = scan.next_back() {
            let (raw_key, raw_value) = item?;
            match Key::decode(&raw_key)? {
                Key::Version(_, version) => {
                    if self.st.is_visible(version) {
                        return Ok(bincode::deserialize(&raw_value)?);
                    }
                }
                _ => return Err(Error::Internal("expected Version key".into())),
            }
        }
        Ok(None)
    }

    /// Iterates over the latest live and visible key/value pairs in a range.
    pub fn scan<R: RangeBounds<Vec<u8>>>(&self, range: R) -> CResult<Scan<'_, E>> {
        let start = match range.start_bound() {
            Bound::Included(k) => Bound::Included(Key::Version(k.as_slice().into(), 0).encode()?),
            Bound::Excluded(k) => {
                Bound::Excluded(Key::Version(k.as_slice().into(), u64::MAX).encode()?)
            }
            Bound::Unbounded => Bound::Included(KeyPrefix::Version(vec![].into()).encode()?),
        };
        let end = match range.end_bound() {
            Bound::Included(k) => {
                Bound::Included(Key::Version(k.as_slice().into(), u64::MAX).encode()?)
            }
            Bound::Excluded(k) => Bound::Excluded(Key::Version(k.as_slice().into(), 0).encode()?),
            Bound::Unbounded => Bound::Excluded(KeyPrefix::Unversioned.encode()?),
        };
        Ok(Scan::new(lock(&self.engine)?, &self.st, start, end))
    }

    /// Iterates over the latest live and visible key/value pairs with the given prefix.
    pub fn scan_prefix(&self, prefix: &[u8]) -> CResult<Scan<'_, E>> {
        let start_bytes = KeyPrefix::Version(prefix.into()).encode()?;
        let start = Bound::Included(start_bytes.clone());
        let end = match start_bytes.iter().rposition(|b| *b != 0xff) {
            Some(i) => Bound::Excluded(
                start_bytes.iter().take(i).copied().chain(std::iter::once(start_bytes[i] + 1)).collect(),
            ),
            None => Bound::Unbounded,
        };
        Ok(Scan::new(lock(&self.engine)?, &self.st, start, end))
    }
}
