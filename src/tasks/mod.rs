//! Bounded-concurrency task scheduler.
//!
//! Wraps long-running operations (full re-indexing, ad-hoc query execution,
//! content analysis) as tracked tasks: at most `max_concurrent` of them
//! execute at once, every task's status and outcome stay queryable after it
//! finishes, and a failing task yields a `Failed` result instead of
//! propagating to the caller or its sibling tasks.
//!
//! ```text
//! pending ──► running ──► completed
//!                │   └───► failed
//!                └───────► cancelled   (abort while in the live-task table)
//! ```

pub mod builtin;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, join_all};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of tasks allowed to execute at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Error type task bodies may fail with; captured into the task's result.
pub type TaskFailure = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by scheduler lookups.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// The task id is not in the registry.
    #[error("unknown task: {task_id}")]
    #[diagnostic(code(marginalia::tasks::not_found))]
    NotFound { task_id: Uuid },

    /// The task exists but has not reached a terminal state yet.
    #[error("task {task_id} has not finished")]
    #[diagnostic(code(marginalia::tasks::not_finished))]
    NotFinished { task_id: Uuid },
}

/// Lifecycle state of a tracked task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Status, timestamps, and outcome of one task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Value produced by a completed task.
    pub result: Option<serde_json::Value>,
    /// Captured failure of a failed or cancelled task.
    pub error: Option<String>,
}

/// A named unit of work for [`TaskScheduler::run_concurrently`].
pub struct TaskSpec {
    name: String,
    future: BoxFuture<'static, Result<serde_json::Value, TaskFailure>>,
}

impl TaskSpec {
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<serde_json::Value, TaskFailure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            future: Box::pin(future),
        }
    }
}

/// Executes tasks under a fixed concurrency limit and tracks their results.
///
/// The scheduler owns its task registry for the process lifetime; records
/// are never evicted. Cancellation is best-effort: the abort lands at the
/// task's next suspension point, and network calls already issued by the
/// task run to completion on the remote side regardless.
pub struct TaskScheduler {
    semaphore: Arc<Semaphore>,
    registry: Arc<RwLock<FxHashMap<Uuid, TaskResult>>>,
    live: Arc<RwLock<FxHashMap<Uuid, AbortHandle>>>,
    max_concurrent: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            registry: Arc::new(RwLock::new(FxHashMap::default())),
            live: Arc::new(RwLock::new(FxHashMap::default())),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execute one task, waiting for a concurrency slot first.
    ///
    /// Always returns a terminal [`TaskResult`]; failures and panics inside
    /// the task body are captured into it rather than propagated.
    pub async fn run<F>(&self, name: impl Into<String>, future: F) -> TaskResult
    where
        F: Future<Output = Result<serde_json::Value, TaskFailure>> + Send + 'static,
    {
        let name = name.into();
        let task_id = Uuid::new_v4();
        self.registry.write().insert(
            task_id,
            TaskResult {
                task_id,
                name: name.clone(),
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                result: None,
                error: None,
            },
        );
        debug!(task = %name, %task_id, "task registered");

        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            // The semaphore is never closed; this arm keeps `run` total.
            return self.finish(task_id, TaskStatus::Failed, None, Some("scheduler unavailable".into()));
        };

        self.update(task_id, |record| {
            record.status = TaskStatus::Running;
            record.started_at = Some(Utc::now());
        });
        info!(task = %name, %task_id, "task started");

        let handle = tokio::spawn(async move {
            let _permit = permit;
            future.await
        });
        self.live.write().insert(task_id, handle.abort_handle());

        let outcome = handle.await;
        self.live.write().remove(&task_id);

        match outcome {
            Ok(Ok(value)) => {
                info!(task = %name, %task_id, "task completed");
                self.finish(task_id, TaskStatus::Completed, Some(value), None)
            }
            Ok(Err(err)) => {
                warn!(task = %name, %task_id, error = %err, "task failed");
                self.finish(task_id, TaskStatus::Failed, None, Some(err.to_string()))
            }
            Err(join_err) if join_err.is_cancelled() => {
                info!(task = %name, %task_id, "task cancelled");
                self.finish(
                    task_id,
                    TaskStatus::Cancelled,
                    None,
                    Some("task cancelled".into()),
                )
            }
            Err(join_err) => {
                warn!(task = %name, %task_id, error = %join_err, "task panicked");
                self.finish(
                    task_id,
                    TaskStatus::Failed,
                    None,
                    Some(format!("task panicked: {join_err}")),
                )
            }
        }
    }

    /// Execute all specs concurrently under the limit.
    ///
    /// Output slot `i` always holds the result of input spec `i`, no matter
    /// in which order the tasks actually finished; a failing spec yields a
    /// `Failed` entry without aborting the batch.
    pub async fn run_concurrently(&self, specs: Vec<TaskSpec>) -> Vec<TaskResult> {
        join_all(
            specs
                .into_iter()
                .map(|spec| self.run(spec.name, spec.future)),
        )
        .await
    }

    /// Current status of a task.
    pub fn status(&self, task_id: Uuid) -> Result<TaskStatus, SchedulerError> {
        self.registry
            .read()
            .get(&task_id)
            .map(|record| record.status)
            .ok_or(SchedulerError::NotFound { task_id })
    }

    /// Terminal result of a task.
    pub fn result(&self, task_id: Uuid) -> Result<TaskResult, SchedulerError> {
        let registry = self.registry.read();
        let record = registry
            .get(&task_id)
            .ok_or(SchedulerError::NotFound { task_id })?;
        if !record.status.is_terminal() {
            return Err(SchedulerError::NotFinished { task_id });
        }
        Ok(record.clone())
    }

    /// Issue a best-effort cancellation.
    ///
    /// Returns `true` only when the task was found in the live-task table
    /// and an abort signal was issued. The abort takes effect at the task's
    /// next suspension point; synchronous stretches and already-issued
    /// network calls are not interrupted.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.live.read().get(&task_id) {
            Some(handle) => {
                handle.abort();
                info!(%task_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Every tracked task, oldest first.
    pub fn snapshot(&self) -> Vec<TaskResult> {
        let mut records: Vec<TaskResult> = self.registry.read().values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    fn update(&self, task_id: Uuid, apply: impl FnOnce(&mut TaskResult)) {
        if let Some(record) = self.registry.write().get_mut(&task_id) {
            apply(record);
        }
    }

    fn finish(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> TaskResult {
        let mut registry = self.registry.write();
        // `run` registers every task before it can finish.
        let record = registry.entry(task_id).or_insert_with(|| TaskResult {
            task_id,
            name: String::new(),
            status,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        });
        record.status = status;
        record.completed_at = Some(Utc::now());
        record.result = result;
        record.error = error;
        record.clone()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}
