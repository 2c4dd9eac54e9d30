//! Reconciliation with process restarts and with the repository host

use super::{MergeQueue, entries_to_requeue};
use crate::error::Result;
use crate::types::{EntryStatus, PrState, QueueEntry, TaskColumn};
use tracing::{debug, info, warn};

impl MergeQueue {
    /// Requeue entries whose in-flight work was lost with the process
    ///
    /// `rebasing` and `re_review` go back to `queued`. `merging` is left for
    /// [`sync_external_state`](Self::sync_external_state). Returns how many
    /// entries were requeued.
    pub async fn recover(&self) -> Result<usize> {
        let entries = self.services.queue.list_entries().await?;
        let stale: Vec<QueueEntry> = entries_to_requeue(&entries).into_iter().cloned().collect();

        for mut entry in stale {
            info!(
                entry_id = %entry.id,
                status = %entry.status,
                "requeueing entry interrupted by restart"
            );
            self.set_status(&mut entry, EntryStatus::Queued).await?;
        }

        let merging = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Merging)
            .count();
        if merging > 0 {
            info!(merging, "leaving merging entries to reconciliation");
        }

        Ok(entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Rebasing | EntryStatus::ReReview))
            .count())
    }

    /// Bring entries in line with what happened on the host
    ///
    /// PRs merged outside the queue finish their task; PRs closed unmerged
    /// leave the queue and their task returns to the backlog. Entries are
    /// checked one after another and a failing entry does not stop the rest.
    pub async fn sync_external_state(&self) -> Result<()> {
        let entries = self.services.queue.list_entries().await?;

        for entry in entries.into_iter().filter(|e| !e.status.is_terminal()) {
            let entry_id = entry.id.clone();
            if let Err(e) = self.sync_entry(entry).await {
                warn!(%entry_id, error = %e, "failed to sync entry with host");
            }
        }
        Ok(())
    }

    async fn sync_entry(&self, mut entry: QueueEntry) -> Result<()> {
        let project = self.services.require_project(&entry.project_id).await?;
        let details = self
            .services
            .platform
            .get_pr_details(&project.repo, entry.pr_number)
            .await?;

        match details.state {
            PrState::Open => {
                debug!(entry_id = %entry.id, "PR still open");
                Ok(())
            }
            PrState::Merged => {
                info!(
                    entry_id = %entry.id,
                    pr_number = entry.pr_number,
                    "PR merged outside the queue"
                );
                let report = format!("PR #{} merged outside the merge queue", entry.pr_number);
                self.mark_merged(&mut entry, report).await
            }
            PrState::Closed => {
                info!(
                    entry_id = %entry.id,
                    pr_number = entry.pr_number,
                    "PR closed without merge, dropping entry"
                );
                if self.services.queue.delete_entry(&entry.id).await? {
                    self.notify_removed(&entry);
                }
                let patch = self
                    .services
                    .patch()
                    .column(TaskColumn::Backlog)
                    .clear_assignee();
                self.services.update_task(&entry.task_id, patch).await?;
                Ok(())
            }
        }
    }
}
