//! Terminal styling helpers
//!
//! Output goes through `anstream`, which strips the escapes when stdout is
//! not a color-capable terminal.

use owo_colors::OwoColorize;
use pr_shepherd::types::EntryStatus;
use std::fmt::Display;

/// Semantic styles for CLI output
pub trait Stylize {
    /// Secondary information
    fn muted(&self) -> String;
    /// Headings and identifiers
    fn emphasis(&self) -> String;
    /// Positive outcome
    fn success(&self) -> String;
    /// Needs attention
    fn warning(&self) -> String;
    /// Negative outcome
    fn failure(&self) -> String;
}

impl<T: Display> Stylize for T {
    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    fn success(&self) -> String {
        self.green().to_string()
    }

    fn warning(&self) -> String {
        self.yellow().to_string()
    }

    fn failure(&self) -> String {
        self.red().to_string()
    }
}

/// Status label colored by what it means for the queue
pub fn status_label(status: EntryStatus) -> String {
    let label = format!("{:<9}", status.to_string());
    match status {
        EntryStatus::Queued => label.muted(),
        EntryStatus::Rebasing | EntryStatus::ReReview | EntryStatus::Merging => {
            label.cyan().bold().to_string()
        }
        EntryStatus::Merged => label.success(),
        EntryStatus::Conflict => label.warning(),
        EntryStatus::Failed => label.failure(),
    }
}
