//! Local store: rows behind a mutex, optionally persisted to a state file

use super::{
    LockMode, QueueStore, StateLock, StoreState, TaskPatch, TaskStore, load_state, save_state,
};
use crate::error::Result;
use crate::pipeline::{Directive, Dispatcher};
use crate::types::{Project, QueueEntry, Task};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Task store, queue table and directive outbox
///
/// With a backing file the file is the source of truth: every read reloads
/// it under a shared lock, and every mutation reloads, applies and writes it
/// back under an exclusive lock. Several processes (the daemon and one-shot
/// CLI commands) can therefore share one state file without losing writes.
#[derive(Debug)]
pub struct LocalStore {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self::from_state(StoreState::new())
    }

    /// In-memory store seeded with `state`
    pub const fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
            path: None,
        }
    }

    /// Store backed by a state file, loading it if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        debug!(
            path = %path.display(),
            tasks = state.tasks.len(),
            entries = state.entries.len(),
            "opened state file"
        );
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current rows
    pub fn snapshot(&self) -> Result<StoreState> {
        self.read(Clone::clone)
    }

    /// Insert or replace a project
    pub fn put_project(&self, project: Project) -> Result<()> {
        self.mutate(|state| {
            state.upsert_project(project);
            Ok(())
        })
    }

    /// Insert or replace a task
    pub fn put_task(&self, task: Task) -> Result<()> {
        self.mutate(|state| {
            state.upsert_task(task);
            Ok(())
        })
    }

    /// Remove and return all pending directives
    pub fn drain_outbox(&self) -> Result<Vec<Directive>> {
        self.mutate(|state| Ok(std::mem::take(&mut state.outbox)))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a read against the freshest rows
    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T> {
        let mut state = self.lock();
        if let Some(path) = &self.path {
            let _file_lock = StateLock::acquire(path, LockMode::Shared)?;
            *state = load_state(path)?;
        }
        Ok(f(&state))
    }

    /// Reload, run a mutation and persist the result under the file lock
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let Some(path) = &self.path else {
            return f(&mut state);
        };

        let _file_lock = StateLock::acquire(path, LockMode::Exclusive)?;
        let mut fresh = load_state(path)?;
        let result = f(&mut fresh)?;
        save_state(path, &fresh)?;
        *state = fresh;
        Ok(result)
    }
}

#[async_trait]
impl TaskStore for LocalStore {
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.read(|state| state.task(task_id).cloned())
    }

    async fn list_tasks_with_pr(&self) -> Result<Vec<Task>> {
        self.read(StoreState::tasks_with_pr)
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        self.mutate(|state| state.patch_task(task_id, patch))
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.read(|state| state.project(project_id).cloned())
    }
}

#[async_trait]
impl QueueStore for LocalStore {
    async fn append_entry(&self, entry: QueueEntry) -> Result<(QueueEntry, bool)> {
        self.mutate(|state| Ok(state.append_entry(entry)))
    }

    async fn get_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
        self.read(|state| state.entry(entry_id).cloned())
    }

    async fn entry_for_task(&self, task_id: &str) -> Result<Option<QueueEntry>> {
        self.read(|state| state.entry_for_task(task_id).cloned())
    }

    async fn list_entries(&self) -> Result<Vec<QueueEntry>> {
        self.read(StoreState::sorted_entries)
    }

    async fn save_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.mutate(|state| state.replace_entry(entry))
    }

    async fn delete_entry(&self, entry_id: &str) -> Result<bool> {
        self.mutate(|state| Ok(state.remove_entry(entry_id)))
    }

    async fn withdraw_queued(&self, task_id: &str) -> Result<Option<QueueEntry>> {
        self.mutate(|state| Ok(state.withdraw_queued(task_id)))
    }
}

#[async_trait]
impl Dispatcher for LocalStore {
    async fn dispatch(&self, directive: Directive) -> Result<()> {
        debug!(
            task_id = %directive.task_id,
            to = %directive.to_agent_id,
            "queued directive"
        );
        self.mutate(|state| {
            state.outbox.push(directive);
            Ok(())
        })
    }
}
