//! User-facing console output.
//!
//! Diagnostics go through `tracing` to stderr; everything here is the
//! interactive transcript printed to stdout.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

const TICK: &str = "\u{2714}";
const CROSS: &str = "\u{2716}";
const WARN: &str = "\u{26a0}";

pub(crate) fn banner() {
    println!("Knowledge Architect v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "-".repeat(30));
}

pub(crate) fn loaded(notes: usize, blocks: usize) {
    println!("Knowledge base: {notes} notes, {blocks} blocks.");
}

pub(crate) fn processing(path: &str) {
    println!("\nNow processing\n   {path}");
}

/// Ask for a note path on stdin.
///
/// Backslashes are normalized to `/` and surrounding quotes (as left by
/// drag-and-drop into a terminal) are stripped.
pub(crate) fn prompt_path(prompt: &str) -> Result<String> {
    print!("\n{prompt}\n> ");
    io::stdout().flush().context("flushing stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading note path from stdin")?;
    Ok(clean_path_input(&line))
}

pub(crate) fn clean_path_input(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .replace('\\', "/")
}

pub(crate) fn finding_connections(path: &str) {
    println!("\nFinding connections for {path}...");
}

pub(crate) fn connections_header() {
    println!("\nConnections found");
}

pub(crate) fn connection(title: &str, score: f32) {
    println!("  \u{2514}\u{2500} {title} ({score:.2})");
}

pub(crate) fn connection_skipped(title: &str) {
    println!("  \u{2514}\u{2500} Could not read content for \"{title}\". Skipping.");
}

pub(crate) fn warning(message: &str) {
    println!("{WARN} Warning: {message}");
}

pub(crate) fn error(message: &str) {
    eprintln!("\n{CROSS} Error: {message}");
}

pub(crate) fn success(path: &str) {
    println!("\n{TICK} Success!");
    println!("   Map of Content saved to:\n   {path}");
}

/// A long-running step: a spinner with the `progress` feature, plain lines without.
pub(crate) struct Activity {
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl Activity {
    #[cfg(feature = "progress")]
    pub(crate) fn start(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        bar.set_message(message.to_string());
        Self { bar }
    }

    #[cfg(not(feature = "progress"))]
    pub(crate) fn start(message: &str) -> Self {
        println!("{message}...");
        Self {}
    }

    pub(crate) fn finish(self, message: &str) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
        println!("{TICK} {message}");
    }

    /// Stop without a completion line, e.g. when the step failed.
    pub(crate) fn abandon(self) {
        #[cfg(feature = "progress")]
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_input_is_normalized() {
        assert_eq!(clean_path_input("  'UPSC\\GS2\\Polity.md'\n"), "UPSC/GS2/Polity.md");
        assert_eq!(clean_path_input("\"a b.md\""), "a b.md");
        assert_eq!(clean_path_input("plain.md"), "plain.md");
    }
}
