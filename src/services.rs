//! Collaborators shared by the merge queue and the review monitor

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink, NullSink};
use crate::git::GitExecutor;
use crate::pipeline::{DisabledPipeline, Dispatcher, PipelineManager};
use crate::platform::PlatformService;
use crate::store::{QueueStore, TaskPatch, TaskStore};
use crate::types::{Project, Task};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything the schedulers talk to
///
/// The two schedulers never call each other; they share these handles and
/// coordinate through the rows behind `tasks` and `queue`.
#[derive(Clone)]
pub struct Services {
    /// Kanban tasks and projects
    pub tasks: Arc<dyn TaskStore>,
    /// Merge queue table
    pub queue: Arc<dyn QueueStore>,
    /// Repository host client
    pub platform: Arc<dyn PlatformService>,
    /// Git executor
    pub git: Arc<dyn GitExecutor>,
    /// Optional review pipeline
    pub pipeline: Arc<dyn PipelineManager>,
    /// Directive delivery
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Notification sink
    pub events: Arc<dyn EventSink>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Bundle the required collaborators; the pipeline starts disabled,
    /// events are dropped and the wall clock is used
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueStore>,
        platform: Arc<dyn PlatformService>,
        git: Arc<dyn GitExecutor>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            tasks,
            queue,
            platform,
            git,
            pipeline: Arc::new(DisabledPipeline),
            dispatcher,
            events: Arc::new(NullSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Install a review pipeline
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<dyn PipelineManager>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Install a notification sink
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Install a clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Empty task patch stamped with the current time
    pub fn patch(&self) -> TaskPatch {
        TaskPatch::new(self.now())
    }

    /// Fetch a task that must exist
    pub async fn require_task(&self, task_id: &str) -> Result<Task> {
        self.tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// Fetch a project that must exist
    pub async fn require_project(&self, project_id: &str) -> Result<Project> {
        self.tasks
            .get_project(project_id)
            .await?
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))
    }

    /// Patch a task and tell observers about it
    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task> {
        let task = self.tasks.update_task(task_id, patch).await?;
        self.events.emit(Event::TaskUpdated { task: task.clone() });
        Ok(task)
    }
}
