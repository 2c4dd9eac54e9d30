//! Queue planning - pure functions deciding what the next tick does
//!
//! No I/O happens here; the scheduler loads the rows and acts on the result.

use crate::types::{EntryStatus, QueueEntry};

/// What the scheduler should do with the single-flight slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// An entry already holds the slot
    Busy {
        /// Entry holding the slot
        entry_id: String,
        /// Its status
        status: EntryStatus,
    },
    /// Process this entry
    Process {
        /// Entry to process
        entry_id: String,
    },
    /// Nothing is queued
    Idle,
}

/// Pick the next step for the global queue
///
/// Any entry in `rebasing`, `re_review` or `merging` blocks the whole queue,
/// regardless of project. Otherwise the `queued` entry with the lowest
/// position runs; ties go to the earlier approval.
#[must_use]
pub fn plan_next(entries: &[QueueEntry]) -> NextStep {
    if let Some(active) = entries.iter().find(|e| e.status.is_active()) {
        return NextStep::Busy {
            entry_id: active.id.clone(),
            status: active.status,
        };
    }

    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Queued)
        .min_by_key(|e| (e.position, e.approved_at))
        .map_or(NextStep::Idle, |e| NextStep::Process {
            entry_id: e.id.clone(),
        })
}

/// Entries whose progress cannot be trusted after a restart
///
/// `rebasing` and `re_review` are redone from scratch. `merging` is left to
/// reconciliation because the merge may already have happened.
#[must_use]
pub fn entries_to_requeue(entries: &[QueueEntry]) -> Vec<&QueueEntry> {
    entries
        .iter()
        .filter(|e| matches!(e.status, EntryStatus::Rebasing | EntryStatus::ReReview))
        .collect()
}

/// Commit title for the squash merge
#[must_use]
pub fn merge_commit_title(task_title: &str, pr_number: u64) -> String {
    format!("{} (#{pr_number})", task_title.trim())
}

/// Comment posted on a PR whose rebase stopped on conflicts
#[must_use]
pub fn conflict_comment(entry: &QueueEntry, detail: &str) -> String {
    let mut body = format!(
        "**Merge queue:** rebasing `{}` onto `{}` failed, so this PR was taken out of the queue.\n\n\
         Resolve the conflicts on the branch and approve the task for merge again.",
        entry.pr_branch, entry.base_branch
    );
    let detail = detail.trim();
    if !detail.is_empty() {
        body.push_str("\n\n<details><summary>git output</summary>\n\n```\n");
        body.push_str(detail);
        body.push_str("\n```\n</details>");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: &str, status: EntryStatus, position: i64) -> QueueEntry {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        QueueEntry {
            id: id.to_string(),
            task_id: format!("task-{id}"),
            project_id: "p1".to_string(),
            pr_number: 1,
            pr_branch: "feat/x".to_string(),
            base_branch: "main".to_string(),
            status,
            position,
            rebase_attempts: 0,
            last_error: None,
            approved_at: at,
            merged_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_empty_queue_is_idle() {
        assert_eq!(plan_next(&[]), NextStep::Idle);
    }

    #[test]
    fn test_lowest_position_wins() {
        let entries = vec![
            entry("a", EntryStatus::Queued, 5),
            entry("b", EntryStatus::Queued, 2),
            entry("c", EntryStatus::Queued, 9),
        ];
        assert_eq!(
            plan_next(&entries),
            NextStep::Process {
                entry_id: "b".to_string()
            }
        );
    }

    #[test]
    fn test_equal_positions_fall_back_to_approval_time() {
        let mut later = entry("later", EntryStatus::Queued, 1);
        later.approved_at += Duration::minutes(5);
        let entries = vec![later, entry("earlier", EntryStatus::Queued, 1)];
        assert_eq!(
            plan_next(&entries),
            NextStep::Process {
                entry_id: "earlier".to_string()
            }
        );
    }

    #[test]
    fn test_active_entry_blocks_every_project() {
        let mut other_project = entry("q", EntryStatus::Queued, 1);
        other_project.project_id = "p2".to_string();
        let entries = vec![other_project, entry("m", EntryStatus::Merging, 7)];
        assert_eq!(
            plan_next(&entries),
            NextStep::Busy {
                entry_id: "m".to_string(),
                status: EntryStatus::Merging
            }
        );
    }

    #[test]
    fn test_terminal_and_conflict_entries_are_skipped() {
        let entries = vec![
            entry("x", EntryStatus::Conflict, 1),
            entry("y", EntryStatus::Failed, 2),
            entry("z", EntryStatus::Merged, 3),
        ];
        assert_eq!(plan_next(&entries), NextStep::Idle);
    }

    #[test]
    fn test_requeue_selection_leaves_merging_alone() {
        let entries = vec![
            entry("r", EntryStatus::Rebasing, 1),
            entry("v", EntryStatus::ReReview, 2),
            entry("m", EntryStatus::Merging, 3),
            entry("q", EntryStatus::Queued, 4),
        ];
        let ids: Vec<_> = entries_to_requeue(&entries)
            .into_iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["r", "v"]);
    }

    #[test]
    fn test_merge_commit_title() {
        assert_eq!(merge_commit_title("Add login ", 42), "Add login (#42)");
    }

    #[test]
    fn test_conflict_comment_includes_output() {
        let e = entry("a", EntryStatus::Conflict, 1);
        let body = conflict_comment(&e, "CONFLICT (content): src/lib.rs\n");
        assert!(body.contains("`feat/x` onto `main`"));
        assert!(body.contains("CONFLICT (content): src/lib.rs"));

        let bare = conflict_comment(&e, "   ");
        assert!(!bare.contains("<details>"));
    }
}
