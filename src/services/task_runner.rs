//! Owns one hardening run from admission to the final task row.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RoundContext, RunVerdict, TaskStatus};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};
use crate::services::round_engine::RoundEngine;

pub struct HardeningRunner<T: TaskRepository, C: ExploitCaseRepository> {
    tasks: Arc<T>,
    engine: Arc<RoundEngine<T, C>>,
}

impl<T, C> Clone for HardeningRunner<T, C>
where
    T: TaskRepository,
    C: ExploitCaseRepository,
{
    fn clone(&self) -> Self {
        Self { tasks: Arc::clone(&self.tasks), engine: Arc::clone(&self.engine) }
    }
}

impl<T, C> HardeningRunner<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    pub fn new(tasks: Arc<T>, engine: Arc<RoundEngine<T, C>>) -> Self {
        Self { tasks, engine }
    }

    /// Mark the task running, drive the engine and write the verdict.
    ///
    /// Errors are returned only when the run could not start (unknown task,
    /// invalid transition, failed initial write). Once started, every
    /// outcome is a verdict.
    pub async fn run(&self, task_id: Uuid, cancel: CancellationToken) -> DomainResult<RunVerdict> {
        let mut task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;

        if cancel.is_cancelled() {
            info!(task_id = %task_id, "Run cancelled before start");
            return Ok(RunVerdict::Stopped { rounds: task.round_count });
        }

        let from = task.status;
        task.transition_to(TaskStatus::Running).map_err(|reason| DomainError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: TaskStatus::Running.as_str().to_string(),
            reason,
        })?;
        task.current_phase = Some("Initializing".to_string());
        task.result_summary = None;
        self.tasks.update(&task).await?;
        info!(task_id = %task_id, round_count = task.round_count, resumed = from != TaskStatus::Uploaded, "Task running");

        let verdict = match RoundContext::from_task(&task) {
            Some(ctx) => self.engine.run(ctx, &cancel).await,
            None => RunVerdict::ToolFailure { reason: "no contract source uploaded".to_string() },
        };

        self.finalize(task_id, &verdict).await;
        Ok(verdict)
    }

    async fn finalize(&self, task_id: Uuid, verdict: &RunVerdict) {
        let status = verdict.task_status();
        match self.tasks.finish(task_id, status, &verdict.summary()).await {
            Ok(true) => info!(task_id = %task_id, status = status.as_str(), "Task finished"),
            Ok(false) => info!(
                task_id = %task_id,
                verdict = status.as_str(),
                "Task status changed during the run; leaving it as is"
            ),
            Err(e) => error!(task_id = %task_id, error = %e, "Failed to record run verdict"),
        }
    }
}
