//! Queue commands - show, approve, remove, reorder

use crate::cli::context::CommandContext;
use crate::cli::style::{Stylize, status_label};
use anstream::println;
use pr_shepherd::error::Result;
use pr_shepherd::queue::MergeQueue;
use pr_shepherd::store::QueueStore;

/// Print the queue, lowest position first
pub async fn show_queue(ctx: &CommandContext, project: Option<&str>) -> Result<()> {
    let mut entries = ctx.store.list_entries().await?;
    if let Some(project) = project {
        entries.retain(|e| e.project_id == project);
    }

    if entries.is_empty() {
        println!("{}", "Merge queue is empty.".muted());
        return Ok(());
    }

    println!("{}", "Merge queue".emphasis());
    for entry in &entries {
        println!(
            "  {:>4}  {}  PR #{:<6} {}  {}",
            entry.position,
            status_label(entry.status),
            entry.pr_number,
            entry.pr_branch,
            format!("{} → {}", entry.project_id, entry.base_branch).muted(),
        );
        println!("        {}", format!("entry {}  task {}", entry.id, entry.task_id).muted());
        if let Some(err) = &entry.last_error {
            let first = err.lines().next().unwrap_or_default();
            println!("        {}", first.failure());
        }
    }
    Ok(())
}

/// Approve a task's PR for merge
pub async fn approve(ctx: &CommandContext, task_id: &str) -> Result<()> {
    let local = ctx.local()?;
    let queue = MergeQueue::new(local.services, local.credentials);

    match queue.approve_for_merge(task_id).await? {
        Some(entry) => println!(
            "{} PR #{} queued at position {}",
            "✓".success(),
            entry.pr_number,
            entry.position
        ),
        None => println!(
            "{}",
            format!("Task {task_id} has no pull request; nothing queued.").warning()
        ),
    }
    Ok(())
}

/// Take a task out of the queue
pub async fn remove(ctx: &CommandContext, task_id: &str) -> Result<()> {
    let local = ctx.local()?;
    let queue = MergeQueue::new(local.services, local.credentials);

    if queue.remove_from_queue(task_id).await? {
        println!("{} Removed task {task_id} from the merge queue", "✓".success());
    } else {
        println!("{}", format!("Task {task_id} is not queued.").muted());
    }
    Ok(())
}

/// Move an entry to a new position
pub async fn reorder(ctx: &CommandContext, entry_id: &str, position: i64) -> Result<()> {
    let local = ctx.local()?;
    let queue = MergeQueue::new(local.services, local.credentials);

    let entry = queue.reorder_entry(entry_id, position).await?;
    println!(
        "{} PR #{} moved to position {}",
        "✓".success(),
        entry.pr_number,
        entry.position
    );
    Ok(())
}
