//! Output formatting utilities for the CLI

use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub static CHECK: Emoji<'_, '_> = Emoji("✓ ", "OK ");
pub static CROSS: Emoji<'_, '_> = Emoji("✗ ", "ERR ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠ ", "! ");

/// Create a spinner with message
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print success message
pub fn success(msg: impl Into<String>) {
    println!("{}{}", style(CHECK).green(), style(msg.into()).green());
}

/// Print error message
pub fn error(msg: impl Into<String>) {
    eprintln!("{}{}", style(CROSS).red(), style(msg.into()).red());
}

/// Print info message
pub fn info(msg: impl Into<String>) {
    println!("{}{}", style(INFO).cyan(), msg.into());
}

/// Print warning message
pub fn warn(msg: impl Into<String>) {
    eprintln!("{}{}", style(WARN).yellow(), style(msg.into()).yellow());
}

/// Pretty JSON for a task result, falling back to compact output
pub fn json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
