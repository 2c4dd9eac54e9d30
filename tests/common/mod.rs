//! Shared test fixtures: mocks for every collaborator and a seeded harness

#![allow(dead_code)]

pub mod mock_platform;

pub use mock_platform::MockPlatformService;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pr_shepherd::clock::ManualClock;
use pr_shepherd::error::{Error, Result};
use pr_shepherd::events::{Event, EventSink};
use pr_shepherd::git::{GitCredentials, GitExecutor, RebaseOutcome};
use pr_shepherd::monitor::ReviewMonitor;
use pr_shepherd::pipeline::{PipelineManager, ReReviewRequest, ReReviewTicket};
use pr_shepherd::queue::MergeQueue;
use pr_shepherd::services::Services;
use pr_shepherd::store::{LocalStore, TaskStore};
use pr_shepherd::types::{
    Project, RepoSlug, Review, ReviewComment, ReviewState, Task, TaskColumn,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const PROJECT_ID: &str = "p1";
pub const DELEGATE: &str = "lead-agent";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

// =============================================================================
// Mock git
// =============================================================================

/// Call record for `rebase_branch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseCall {
    pub repo_path: PathBuf,
    pub branch: String,
    pub base: String,
}

/// [`GitExecutor`] that records calls and conflicts on chosen branches
#[derive(Default)]
pub struct MockGit {
    conflicts: Mutex<HashMap<String, String>>,
    fail_push: Mutex<Option<String>>,
    rebase_calls: Mutex<Vec<RebaseCall>>,
    push_calls: Mutex<Vec<String>>,
}

impl MockGit {
    /// Make rebasing `branch` stop with a conflict
    pub fn conflict_on(&self, branch: &str, detail: &str) {
        self.conflicts
            .lock()
            .unwrap()
            .insert(branch.to_string(), detail.to_string());
    }

    /// Make every push fail
    pub fn fail_push(&self, msg: &str) {
        *self.fail_push.lock().unwrap() = Some(msg.to_string());
    }

    pub fn rebase_calls(&self) -> Vec<RebaseCall> {
        self.rebase_calls.lock().unwrap().clone()
    }

    pub fn push_calls(&self) -> Vec<String> {
        self.push_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitExecutor for MockGit {
    async fn rebase_branch(
        &self,
        repo_path: &Path,
        branch: &str,
        base: &str,
        _credentials: &GitCredentials,
    ) -> Result<RebaseOutcome> {
        self.rebase_calls.lock().unwrap().push(RebaseCall {
            repo_path: repo_path.to_path_buf(),
            branch: branch.to_string(),
            base: base.to_string(),
        });
        Ok(self
            .conflicts
            .lock()
            .unwrap()
            .get(branch)
            .cloned()
            .map_or(RebaseOutcome::Rebased, RebaseOutcome::Conflict))
    }

    async fn force_push_branch(
        &self,
        _repo_path: &Path,
        branch: &str,
        _credentials: &GitCredentials,
    ) -> Result<()> {
        self.push_calls.lock().unwrap().push(branch.to_string());
        match self.fail_push.lock().unwrap().clone() {
            Some(msg) => Err(Error::Git(msg)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Recording pipeline
// =============================================================================

/// Call record for `handle_review_feedback`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCall {
    pub task_id: String,
    pub feedback: String,
    pub branch: String,
    pub pr_number: u64,
}

/// [`PipelineManager`] that keeps every ticket for the test to resolve
#[derive(Default)]
pub struct RecordingPipeline {
    enabled: Mutex<HashSet<String>>,
    fail_start: Mutex<bool>,
    start_calls: Mutex<Vec<ReReviewRequest>>,
    tickets: Mutex<Vec<ReReviewTicket>>,
    feedback_calls: Mutex<Vec<FeedbackCall>>,
}

impl RecordingPipeline {
    pub fn enable(&self, project_id: &str) {
        self.enabled.lock().unwrap().insert(project_id.to_string());
    }

    pub fn fail_start(&self) {
        *self.fail_start.lock().unwrap() = true;
    }

    pub fn start_calls(&self) -> Vec<ReReviewRequest> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn feedback_calls(&self) -> Vec<FeedbackCall> {
        self.feedback_calls.lock().unwrap().clone()
    }

    /// Resolve the oldest outstanding ticket
    pub fn complete_next(&self, passed: bool) -> bool {
        let ticket = {
            let mut tickets = self.tickets.lock().unwrap();
            if tickets.is_empty() {
                return false;
            }
            tickets.remove(0)
        };
        ticket.complete(passed)
    }
}

#[async_trait]
impl PipelineManager for RecordingPipeline {
    async fn is_enabled(&self, project_id: &str) -> bool {
        self.enabled.lock().unwrap().contains(project_id)
    }

    async fn start_re_review(
        &self,
        request: ReReviewRequest,
        ticket: ReReviewTicket,
    ) -> Result<()> {
        self.start_calls.lock().unwrap().push(request);
        if *self.fail_start.lock().unwrap() {
            return Err(Error::Pipeline("reviewer unavailable".to_string()));
        }
        self.tickets.lock().unwrap().push(ticket);
        Ok(())
    }

    async fn handle_review_feedback(
        &self,
        task_id: &str,
        feedback: &str,
        branch: &str,
        pr_number: u64,
    ) -> Result<()> {
        self.feedback_calls.lock().unwrap().push(FeedbackCall {
            task_id: task_id.to_string(),
            feedback: feedback.to_string(),
            branch: branch.to_string(),
            pr_number,
        });
        Ok(())
    }
}

// =============================================================================
// Recording event sink
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

// =============================================================================
// Harness
// =============================================================================

/// In-memory store seeded with one project, wired to mocks
pub struct Harness {
    pub store: Arc<LocalStore>,
    pub platform: Arc<MockPlatformService>,
    pub git: Arc<MockGit>,
    pub pipeline: Arc<RecordingPipeline>,
    pub events: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(LocalStore::in_memory())
    }

    pub fn with_store(store: LocalStore) -> Self {
        let store = Arc::new(store);
        store.put_project(make_project(PROJECT_ID)).unwrap();

        let platform = Arc::new(MockPlatformService::new());
        let git = Arc::new(MockGit::default());
        let pipeline = Arc::new(RecordingPipeline::default());
        let events = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new(t0()));

        let services = Services::new(
            store.clone(),
            store.clone(),
            platform.clone(),
            git.clone(),
            store.clone(),
        )
        .with_pipeline(pipeline.clone())
        .with_events(events.clone())
        .with_clock(clock.clone());

        Self {
            store,
            platform,
            git,
            pipeline,
            events,
            clock,
            services,
        }
    }

    pub fn queue(&self) -> MergeQueue {
        MergeQueue::new(self.services.clone(), GitCredentials::github_token("test-token"))
    }

    pub fn monitor(&self) -> ReviewMonitor {
        ReviewMonitor::new(self.services.clone())
    }

    /// Seed a task with a PR in `in_review`
    pub fn add_task(&self, id: &str, pr_number: u64, branch: &str) -> Task {
        let task = make_task(id, Some(pr_number), Some(branch));
        self.store.put_task(task.clone()).unwrap();
        task
    }

    pub fn put_task(&self, task: Task) {
        self.store.put_task(task).unwrap();
    }

    pub async fn task(&self, id: &str) -> Task {
        self.store.get_task(id).await.unwrap().unwrap()
    }
}

pub fn make_project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        repo: RepoSlug::new("acme", "widgets"),
        repo_path: PathBuf::from(format!("/srv/checkouts/{id}")),
        branch: None,
        delegate_agent_id: Some(DELEGATE.to_string()),
    }
}

pub fn make_task(id: &str, pr_number: Option<u64>, branch: Option<&str>) -> Task {
    Task {
        id: id.to_string(),
        project_id: PROJECT_ID.to_string(),
        title: format!("Task {id}"),
        description: format!("Implement {id}"),
        column: TaskColumn::InReview,
        pr_number,
        pr_branch: branch.map(String::from),
        assignee_agent_id: Some("worker-agent".to_string()),
        completion_report: None,
        pipeline_attempt: 0,
        retry_count: 0,
        review_watermark: None,
        updated_at: t0(),
    }
}

pub fn changes_requested(id: u64, body: &str) -> Review {
    Review {
        id,
        state: ReviewState::ChangesRequested,
        body: body.to_string(),
        author: Some("reviewer".to_string()),
        submitted_at: Some(t0()),
    }
}

pub fn approved(id: u64) -> Review {
    Review {
        id,
        state: ReviewState::Approved,
        body: String::new(),
        author: Some("reviewer".to_string()),
        submitted_at: Some(t0()),
    }
}

pub fn diff_comment(review_id: u64, path: &str, line: u64, body: &str) -> ReviewComment {
    ReviewComment {
        id: review_id * 1000 + line,
        review_id: Some(review_id),
        path: path.to_string(),
        line: Some(line),
        body: body.to_string(),
        author: Some("reviewer".to_string()),
    }
}
