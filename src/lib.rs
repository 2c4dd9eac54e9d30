//! pr-shepherd - merge queue and review-cycle monitor for agent-driven pull requests
//!
//! Two timer-driven loops share a task store:
//! - [`queue::MergeQueue`] rebases, re-reviews and squash-merges approved
//!   pull requests one at a time, system-wide
//! - [`monitor::ReviewMonitor`] routes `CHANGES_REQUESTED` feedback back to
//!   the implementer within a fixed review-cycle budget
//!
//! Collaborators (repository host, git, review pipeline, stores, event
//! sinks) sit behind traits bundled in [`services::Services`].

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod monitor;
pub mod pipeline;
pub mod platform;
pub mod queue;
pub mod services;
pub mod store;
pub mod types;

pub use error::{Error, Result};
