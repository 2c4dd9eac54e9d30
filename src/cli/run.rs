//! Run command - both schedulers until Ctrl-C

use crate::cli::context::CommandContext;
use pr_shepherd::error::{Error, Result};
use pr_shepherd::monitor::ReviewMonitor;
use pr_shepherd::queue::MergeQueue;
use std::sync::Arc;
use tracing::{info, warn};

/// Start the merge queue and the review monitor and wait for Ctrl-C
pub async fn run_daemon(ctx: &CommandContext) -> Result<()> {
    let connected = ctx.connect().await?;
    let config = &ctx.config;

    let queue = Arc::new(MergeQueue::new(
        connected.services.clone(),
        connected.credentials,
    ));
    let monitor = Arc::new(
        ReviewMonitor::new(connected.services).with_max_review_cycles(config.max_review_cycles),
    );

    queue.start(config.queue_interval()).await;
    monitor.start(config.monitor_interval());
    info!(
        queue_interval = ?config.queue_interval(),
        monitor_interval = ?config.monitor_interval(),
        max_review_cycles = config.max_review_cycles,
        "shepherd running, press Ctrl-C to stop"
    );

    let signal = tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("failed to listen for Ctrl-C: {e}")));

    monitor.stop().await;
    queue.stop().await;

    match ctx.store.snapshot() {
        Ok(state) if !state.outbox.is_empty() => {
            info!(pending = state.outbox.len(), "directives waiting in the outbox");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to read the outbox"),
    }
    signal
}
