//! Notifications for observers of task and queue state
//!
//! Delivery is fire-and-forget: a sink that cannot deliver logs and drops
//! the event, it never fails the state transition that produced it.

use crate::error::{Error, Result};
use crate::types::{QueueEntry, Task};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A state change observers may care about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A queue entry was created or changed
    EntryUpdated {
        /// The entry after the change
        entry: QueueEntry,
    },
    /// A queue entry was deleted
    EntryRemoved {
        /// Deleted entry id
        entry_id: String,
        /// Task the entry belonged to
        task_id: String,
    },
    /// The ordering or membership of a project's queue changed
    QueueUpdated {
        /// Project whose queue changed
        project_id: String,
    },
    /// A task was changed
    TaskUpdated {
        /// The task after the change
        task: Task,
    },
}

/// Receives events
pub trait EventSink: Send + Sync {
    /// Publish an event
    fn emit(&self, event: Event);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// In-process fan-out over a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: Event) {
        // An error only means nobody is listening right now
        let _ = self.tx.send(event);
    }
}

/// Posts events as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    /// Create a webhook sink
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent("pr-shepherd")
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Notify(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    /// Deliver one event and wait for the response
    pub async fn deliver(&self, event: &Event) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Notify(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(url = %self.url, "delivered event");
        Ok(())
    }
}

impl EventSink for WebhookSink {
    fn emit(&self, event: Event) {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&event).await {
                warn!(error = %e, "dropping event");
            }
        });
    }
}

/// Forwards every event to several sinks
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_updated() -> Event {
        Event::QueueUpdated {
            project_id: "p1".to_string(),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(Event::EntryRemoved {
            entry_id: "e1".to_string(),
            task_id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "entry_removed");
        assert_eq!(json["entry_id"], "e1");
        assert_eq!(json["task_id"], "t1");
    }

    #[tokio::test]
    async fn test_broadcast_fanout() {
        let broadcast = BroadcastSink::new(8);
        let mut first = broadcast.subscribe();
        let mut second = broadcast.subscribe();

        let fanout = FanoutSink::new()
            .with(Arc::new(NullSink))
            .with(Arc::new(broadcast.clone()));
        fanout.emit(queue_updated());

        assert_eq!(first.recv().await.unwrap(), queue_updated());
        assert_eq!(second.recv().await.unwrap(), queue_updated());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        BroadcastSink::new(1).emit(queue_updated());
    }

    #[tokio::test]
    async fn test_webhook_delivers_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/shepherd")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"type":"queue_updated","project_id":"p1"}"#.to_string(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/hooks/shepherd", server.url())).unwrap();
        let sink = WebhookSink::new(url).unwrap();
        sink.deliver(&queue_updated()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/hook", server.url())).unwrap();
        let sink = WebhookSink::new(url).unwrap();
        let err = sink.deliver(&queue_updated()).await.unwrap_err();
        assert!(matches!(err, Error::Notify(_)));
    }
}
