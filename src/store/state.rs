//! In-memory rows and the operations on them

use super::TaskPatch;
use crate::error::{Error, Result};
use crate::pipeline::Directive;
use crate::types::{EntryStatus, Project, QueueEntry, Task};
use serde::{Deserialize, Serialize};

/// Current state file format version
pub const STATE_VERSION: u32 = 1;

/// Everything the local store holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    /// Format version
    #[serde(default)]
    pub version: u32,
    /// Projects on the board
    #[serde(default, rename = "project")]
    pub projects: Vec<Project>,
    /// Kanban tasks
    #[serde(default, rename = "task")]
    pub tasks: Vec<Task>,
    /// Merge queue rows
    #[serde(default, rename = "entry")]
    pub entries: Vec<QueueEntry>,
    /// Directives waiting to be picked up by agents
    #[serde(default, rename = "directive")]
    pub outbox: Vec<Directive>,
}

impl StoreState {
    /// Create an empty state
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Self::default()
        }
    }

    /// Insert or replace a project
    pub fn upsert_project(&mut self, project: Project) {
        match self.projects.iter_mut().find(|p| p.id == project.id) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
    }

    /// Insert or replace a task
    pub fn upsert_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    pub(super) fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub(super) fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    pub(super) fn tasks_with_pr(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.pr_number.is_some())
            .cloned()
            .collect()
    }

    pub(super) fn patch_task(&mut self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        patch.apply(task);
        Ok(task.clone())
    }

    pub(super) fn append_entry(&mut self, mut entry: QueueEntry) -> (QueueEntry, bool) {
        if let Some(existing) = self.entries.iter().find(|e| e.task_id == entry.task_id) {
            return (existing.clone(), false);
        }
        entry.position = self
            .entries
            .iter()
            .map(|e| e.position)
            .max()
            .map_or(1, |max| max + 1);
        self.entries.push(entry.clone());
        (entry, true)
    }

    pub(super) fn entry(&self, entry_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub(super) fn entry_for_task(&self, task_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.task_id == task_id)
    }

    pub(super) fn sorted_entries(&self) -> Vec<QueueEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.position);
        entries
    }

    pub(super) fn withdraw_queued(&mut self, task_id: &str) -> Option<QueueEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.task_id == task_id && e.status == EntryStatus::Queued)?;
        Some(self.entries.remove(index))
    }

    pub(super) fn replace_entry(&mut self, entry: &QueueEntry) -> Result<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| Error::EntryNotFound(entry.id.clone()))?;
        *slot = entry.clone();
        Ok(())
    }

    pub(super) fn remove_entry(&mut self, entry_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != entry_id);
        self.entries.len() != before
    }
}
