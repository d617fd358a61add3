//! Output rendering for CLI commands.
//!
//! Text goes to stdout for humans; `--json` swaps it for one pretty-printed
//! JSON document per command.

use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Emit a command result. In JSON mode `value` is serialized to stdout;
    /// in text mode `text_fn` renders it.
    pub fn emit<T: Serialize>(self, value: &T, text_fn: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self {
            Self::Json => {
                let json = serde_json::to_string_pretty(value)?;
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{json}")?;
            }
            Self::Text => text_fn(value),
        }
        Ok(())
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}
