//! A handful of terminal emoji used by `progressbar`'s status lines.
//! Falls back silently to nothing when the terminal can't render them —
//! callers only ever interpolate these into a format string.

use console::Emoji;

pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️ ", "");
pub static ERROR: Emoji<'_, '_> = Emoji("❌ ", "");
pub static WAVE: Emoji<'_, '_> = Emoji("👋 ", "");
