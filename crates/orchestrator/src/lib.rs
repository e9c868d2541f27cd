//! Async task lifecycle: pending → processing → completed | failed.
//!
//! `TaskOrchestrator` owns a synchronized task table and schedules jobs on
//! the tokio worker pool without blocking the submitter. A job's error or
//! panic is recovered at the worker boundary and becomes a failed task —
//! it never takes down the orchestrator or sibling jobs. Terminal states
//! are written exactly once; a second terminal write is a logged no-op.
//!
//! Errors inside a job are observable only by polling `status`; the
//! submitter already has its task id by the time the job runs.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use common::Error;

// ── Task records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One unit of asynchronous work. Identity is immutable once created;
/// status only moves forward.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Task {
    /// Wall-clock seconds from start to finish, once both are recorded.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Table sizes per status, for heartbeat logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────

type TaskTable = Arc<RwLock<HashMap<String, Task>>>;

/// Owns the task table and the worker-side state machine. Cheap to clone;
/// constructed once and injected wherever submissions happen.
#[derive(Clone)]
pub struct TaskOrchestrator {
    tasks: TaskTable,
    /// Per-task wall-clock limit; `None` disables the timeout.
    timeout: Option<Duration>,
}

impl TaskOrchestrator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Register a job and schedule it on the worker pool. Returns the
    /// fresh task id immediately; the job's outcome is observable only
    /// through [`status`](Self::status).
    pub async fn submit<F>(&self, job: F) -> String
    where
        F: Future<Output = Result<serde_json::Value, Error>> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let task = Task {
            id: id.clone(),
            status: TaskStatus::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
        };
        self.tasks.write().await.insert(id.clone(), task);

        let tasks = self.tasks.clone();
        let timeout = self.timeout;
        let worker_id = id.clone();
        tokio::spawn(async move {
            Self::run_job(tasks, worker_id, timeout, job).await;
        });

        id
    }

    /// Snapshot of a task, or `None` for unknown ids.
    pub async fn status(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn counts(&self) -> TaskCounts {
        let tasks = self.tasks.read().await;
        let mut counts = TaskCounts::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drop terminal tasks that finished more than `retention` before
    /// `now`. Running and pending tasks are never touched. Returns the
    /// number removed.
    pub async fn prune_finished(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            if !task.status.is_terminal() {
                return true;
            }
            match task.ended_at {
                Some(ended) => now - ended < retention,
                None => true,
            }
        });
        before - tasks.len()
    }

    // ── Worker side ───────────────────────────────────────────────────

    async fn run_job<F>(tasks: TaskTable, id: String, timeout: Option<Duration>, job: F)
    where
        F: Future<Output = Result<serde_json::Value, Error>> + Send + 'static,
    {
        Self::mark_processing(&tasks, &id).await;

        let guarded = AssertUnwindSafe(job).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(inner) => inner,
                Err(_) => {
                    Self::finish(
                        &tasks,
                        &id,
                        Err(format!("task timed out after {}s", limit.as_secs())),
                    )
                    .await;
                    return;
                }
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(result)) => Self::finish(&tasks, &id, Ok(result)).await,
            Ok(Err(e)) => Self::finish(&tasks, &id, Err(e.to_string())).await,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!("Task {} panicked: {}", id, detail);
                Self::finish(&tasks, &id, Err("internal error: task panicked".into())).await;
            }
        }
    }

    async fn mark_processing(tasks: &TaskTable, id: &str) {
        let mut tasks = tasks.write().await;
        if let Some(task) = tasks.get_mut(id) {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Processing;
                task.started_at = Some(Utc::now());
            }
        }
    }

    /// Write the terminal state. Exactly-once: if the task is already
    /// terminal the write is dropped with a warning and existing state is
    /// left intact.
    async fn finish(tasks: &TaskTable, id: &str, outcome: Result<serde_json::Value, String>) {
        let mut tasks = tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            warn!("Terminal write for unknown task {}", id);
            return;
        };
        if task.status.is_terminal() {
            warn!(
                "Ignoring duplicate terminal write for task {} (already {})",
                id,
                task.status.as_str()
            );
            return;
        }

        task.ended_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                info!("Task {} completed", id);
            }
            Err(message) => {
                task.status = TaskStatus::Failed;
                task.error = Some(message);
                info!("Task {} failed: {}", id, task.error.as_deref().unwrap_or(""));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_terminal(orch: &TaskOrchestrator, id: &str) -> Task {
        for _ in 0..500 {
            if let Some(task) = orch.status(id).await {
                if task.status.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_successful_job_completes_with_result() {
        let orch = TaskOrchestrator::new(None);
        let id = orch
            .submit(async { Ok(serde_json::json!({"answer": 42})) })
            .await;

        let task = wait_terminal(&orch, &id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(serde_json::json!({"answer": 42})));
        assert!(task.error.is_none());
        assert!(task.duration_secs().is_some());
    }

    #[tokio::test]
    async fn test_failing_job_preserves_error_message() {
        let orch = TaskOrchestrator::new(None);
        let id = orch
            .submit(async { Err(Error::UpstreamData("provider returned 503".into())) })
            .await;

        let task = wait_terminal(&orch, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result.is_none());
        let message = task.error.unwrap();
        assert!(message.contains("provider returned 503"), "got: {message}");
    }

    async fn panicking_job() -> Result<serde_json::Value, Error> {
        panic!("boom inside job");
    }

    #[tokio::test]
    async fn test_panicking_job_fails_without_crashing_orchestrator() {
        let orch = TaskOrchestrator::new(None);
        let id = orch.submit(panicking_job()).await;

        let task = wait_terminal(&orch, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("internal error: task panicked"));

        // The orchestrator still accepts and runs work.
        let id2 = orch.submit(async { Ok(serde_json::json!(1)) }).await;
        let task2 = wait_terminal(&orch, &id2).await;
        assert_eq!(task2.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let orch = TaskOrchestrator::new(None);
        assert!(orch.status("nonexistent-id").await.is_none());
    }

    #[tokio::test]
    async fn test_timeout_forces_failed_state() {
        let orch = TaskOrchestrator::new(Some(Duration::from_millis(50)));
        let id = orch
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(serde_json::json!("too late"))
            })
            .await;

        let task = wait_terminal(&orch, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_terminal_state_is_written_exactly_once() {
        let orch = TaskOrchestrator::new(None);
        let id = orch.submit(async { Ok(serde_json::json!("first")) }).await;
        let task = wait_terminal(&orch, &id).await;
        assert_eq!(task.status, TaskStatus::Completed);

        // A late duplicate terminal write must not disturb the record.
        TaskOrchestrator::finish(&orch.tasks, &id, Err("late failure".into())).await;

        let after = orch.status(&id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert_eq!(after.result, Some(serde_json::json!("first")));
        assert!(after.error.is_none());
        assert_eq!(after.ended_at, task.ended_at);
    }

    #[tokio::test]
    async fn test_every_task_reaches_exactly_one_terminal_state() {
        let orch = TaskOrchestrator::new(None);
        let mut ids = Vec::new();
        for i in 0..20 {
            let id = if i % 3 == 0 {
                orch.submit(async { Err(Error::Internal("odd one out".into())) })
                    .await
            } else {
                orch.submit(async move { Ok(serde_json::json!(i)) }).await
            };
            ids.push(id);
        }

        for id in &ids {
            let task = wait_terminal(&orch, id).await;
            match task.status {
                TaskStatus::Completed => {
                    assert!(task.result.is_some());
                    assert!(task.error.is_none());
                }
                TaskStatus::Failed => {
                    assert!(task.error.is_some());
                    assert!(task.result.is_none());
                }
                other => panic!("non-terminal status {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_terminal_tasks() {
        let orch = TaskOrchestrator::new(None);
        let done = orch.submit(async { Ok(serde_json::json!(1)) }).await;
        wait_terminal(&orch, &done).await;

        let running = orch
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(serde_json::json!(2))
            })
            .await;

        // Zero retention: every finished task is prunable immediately.
        let removed = orch
            .prune_finished(Utc::now(), Duration::from_secs(0))
            .await;
        assert_eq!(removed, 1);
        assert!(orch.status(&done).await.is_none());
        assert!(orch.status(&running).await.is_some());
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let orch = TaskOrchestrator::new(None);
        let a = orch.submit(async { Ok(serde_json::json!(1)) }).await;
        let b = orch
            .submit(async { Err(Error::Internal("nope".into())) })
            .await;
        wait_terminal(&orch, &a).await;
        wait_terminal(&orch, &b).await;

        let counts = orch.counts().await;
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);
    }
}
