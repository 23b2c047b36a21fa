#![feature(const_trait_impl)]

//! `sqlkv-cli` — a REPL/batch shell over the `sqlkv` embedded SQL engine.
//!
//! ## Getting started
//!
//! ```doc
//! ❯ ./sqlkv-cli
//!
//! ██  ██  █        █
//! ██ ██   ██      ██
//! ███      ██    ██
//! ██ ██     ██  ██
//! ██  ██     ████  SQL-over-KV CLI
//!
//! Welcome to kvcli.
//! Connecting to Client.
//!
//!
//! kvcli > CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
//! kvcli > INSERT INTO t (id, name) VALUES (1, 'a');
//! kvcli > SELECT * FROM t;
//! id | name
//! 1 | a
//! ```

pub mod progressbar;
pub mod emoji;
pub mod trace;
pub mod rusty;
pub mod show;
pub mod server;

use crate::progressbar::ProgressOutput;

/// The global progress bar and user-facing message output.
pub static PBAR: ProgressOutput = ProgressOutput::new();
