#![allow(non_camel_case_types)]
#![feature(is_terminal)]
#![feature(const_trait_impl)]
#![feature(exact_size_is_empty)]
// just for cursor.is_empty()
#![feature(cursor_remaining)]


//! `sqlkv` is an embedded SQL database over a sort-ordered key/value store.
//! The store itself is pluggable: an in-memory `BTreeMap` (`storage::memory`)
//! or an append-only log with an in-memory keydir (`storage::log_cask`,
//! bitcask-style). Above it, `mvcc` layers snapshot-isolated transactions,
//! `encoding` gives every value and composite key an order-preserving byte
//! representation, `catalog`/`tree` turn that into named tables and
//! indexes, and `expr`/`plan`/`planner`/`sql`/`engine` turn SQL text into
//! planned, executed reads and writes. [Author fengyang]
//!
//! ## Getting started
//!
//! ```rust
//! use std::path::PathBuf;
//! use sqlkv::error::Error;
//! use sqlkv::storage::engine::Engine;
//! use sqlkv::storage::log_cask::LogCask;
//!
//! fn main() {
//!     println!("Hello, kv CLI!");
//!
//!     run().unwrap();
//!
//!     println!("Bye~");
//! }
//!
//! fn run() -> Result<(), Error> {
//!     let storage_path = PathBuf::new().join("D:/workspace/kv/storage/kvdb");
//!     // let storage_path = tempdir::TempDir::new("demo")?.path().join("kvdb");
//!
//!     let mut engine = LogCask::new(storage_path)?;
//!     engine.set(b"b", vec![0x01])?;
//!     engine.set(b"b", vec![0x02])?;
//!
//!     engine.set(b"e", vec![0x05])?;
//!     engine.delete(b"e")?;
//!
//!     engine.set(b"c", vec![0x00])?;
//!     engine.delete(b"c")?;
//!     engine.set(b"c", vec![0x03])?;
//!
//!     engine.set(b"", vec![])?;
//!
//!     engine.set(b"a", vec![0x01])?;
//!
//!     engine.delete(b"f")?;
//!
//!     engine.delete(b"d")?;
//!     engine.set(b"d", vec![0x04])?;
//!
//!     // Make sure the scan yields the expected results.
//!     assert_eq!(
//!             vec![
//!                 (b"".to_vec(), vec![]),
//!                 (b"a".to_vec(), vec![0x01]),
//!                 (b"b".to_vec(), vec![0x02]),
//!                 (b"c".to_vec(), vec![0x03]),
//!                 (b"d".to_vec(), vec![0x04]),
//!             ],
//!             engine.scan(..).collect::<Result<Vec<_>,Error>> ()?,
//!         );
//!
//!     let rs = engine.flush();
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod storage;
pub mod textfmt;
pub mod mvcc;
pub mod row;

pub mod encoding;
pub mod types;
pub mod tree;
pub mod catalog;
pub mod expr;
pub mod plan;
pub mod planner;
pub mod sql;
pub mod engine;

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::storage::engine::Engine;
    use crate::storage::log_cask::LogCask;

    #[test]
    fn run() -> Result<(), Error> {
        let storage_path = "";
        let path = tempdir::TempDir::new("demo")?.path().join("whosdb");

        let mut engine = LogCask::new(path)?;
        engine.set(b"b", vec![0x01])?;
        engine.set(b"b", vec![0x02])?;

        engine.set(b"e", vec![0x05])?;
        engine.delete(b"e")?;

        engine.set(b"c", vec![0x00])?;
        engine.delete(b"c")?;
        engine.set(b"c", vec![0x03])?;

        engine.set(b"", vec![])?;

        engine.set(b"a", vec![0x01])?;

        engine.delete(b"f")?;

        engine.delete(b"d")?;
        engine.set(b"d", vec![0x04])?;

        // Make sure the scan yields the expected results.
        assert_eq!(
            vec![
                (b"".to_vec(), vec![]),
                (b"a".to_vec(), vec![0x01]),
                (b"b".to_vec(), vec![0x02]),
                (b"c".to_vec(), vec![0x03]),
                (b"d".to_vec(), vec![0x04]),
            ],
            engine.scan(..).collect::<Result<Vec<_>,Error>> ()?,
        );

        let rs = engine.flush();

        Ok(())
    }
}

