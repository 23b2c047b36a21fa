//! The global progress/status output used throughout the CLI: a thin,
//! `--quiet`-aware wrapper over `console`'s colored `eprintln!` (no
//! actual progress bar is driven today, but the `indicatif` dependency
//! and this name are kept for when a long-running command — e.g. a
//! bulk `COPY`/import — needs one).

use std::sync::atomic::{AtomicBool, Ordering};
use console::style;
use crate::emoji;

pub struct ProgressOutput {
    quiet: AtomicBool,
}

impl ProgressOutput {
    pub const fn new() -> Self {
        ProgressOutput { quiet: AtomicBool::new(false) }
    }

    pub fn set_quiet(&self, quiet: bool) {
        self.quiet.store(quiet, Ordering::SeqCst);
    }

    fn is_quiet(&self) -> bool {
        self.quiet.load(Ordering::SeqCst)
    }

    pub fn info(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("{}{}", emoji::SPARKLE, style(message).bold());
        }
    }

    pub fn warn(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("{}{}", emoji::WARN, style(message).yellow());
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}{}", emoji::ERROR, style(message).red());
    }
}
