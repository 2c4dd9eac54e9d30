//! CLI command implementations

mod context;
mod queue;
mod run;
mod style;

pub use context::CommandContext;
pub use queue::{approve, remove, reorder, show_queue};
pub use run::run_daemon;
