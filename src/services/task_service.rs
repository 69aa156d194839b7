//! Task control surface: create, upload, stop, inspect.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::adapters::workspace::WorkspaceRoot;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CaseStatus, ExploitCase, Task, TaskStatus};
use crate::domain::ports::{ExploitCaseRepository, TaskFilters, TaskRepository};
use crate::services::scheduler::ExecutionScheduler;

/// A task row together with its matrix.
#[derive(Debug, Clone)]
pub struct TaskDetail {
    pub task: Task,
    pub cases: Vec<ExploitCase>,
}

impl TaskDetail {
    pub fn active_reds(&self) -> usize {
        self.cases.iter().filter(|c| c.status == CaseStatus::Failing).count()
    }
}

pub struct TaskService<T: TaskRepository, C: ExploitCaseRepository> {
    task_repo: Arc<T>,
    case_repo: Arc<C>,
    workspace: WorkspaceRoot,
}

impl<T: TaskRepository, C: ExploitCaseRepository> TaskService<T, C> {
    pub fn new(task_repo: Arc<T>, case_repo: Arc<C>, workspace: WorkspaceRoot) -> Self {
        Self { task_repo, case_repo, workspace }
    }

    pub async fn create(&self, name: &str) -> DomainResult<Task> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::ValidationFailed("task name cannot be empty".to_string()));
        }
        let task = Task::new(name);
        self.task_repo.create(&task).await?;
        info!(task_id = %task.id, name, "Created task");
        Ok(task)
    }

    /// Attach the contract source. A task accepts exactly one upload.
    pub async fn upload_source(&self, id: Uuid, contract_name: &str, source: &str) -> DomainResult<Task> {
        if source.trim().is_empty() {
            return Err(DomainError::ValidationFailed("contract source is empty".to_string()));
        }
        let mut task = self.get_task(id).await?;
        let from = task.status;
        task.upload_source(contract_name, source).map_err(|reason| DomainError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: TaskStatus::Uploaded.as_str().to_string(),
            reason,
        })?;

        let ws = self.workspace.for_task(id);
        ws.prepare().await?;
        ws.write_primary(contract_name, source).await?;

        self.task_repo.update(&task).await?;
        info!(task_id = %id, contract = contract_name, bytes = source.len(), "Uploaded contract source");
        Ok(task)
    }

    /// Mark the task stopped and cancel its run if this process owns it.
    ///
    /// The engine observes the cancellation at its next node boundary.
    pub async fn request_stop(&self, id: Uuid, scheduler: Option<&ExecutionScheduler>) -> DomainResult<Task> {
        let mut task = self.get_task(id).await?;
        let from = task.status;
        task.transition_to(TaskStatus::Stopped).map_err(|reason| DomainError::InvalidStateTransition {
            from: from.as_str().to_string(),
            to: TaskStatus::Stopped.as_str().to_string(),
            reason,
        })?;
        self.task_repo.update(&task).await?;

        let cancelled = match scheduler {
            Some(scheduler) => scheduler.cancel(id).await,
            None => false,
        };
        info!(task_id = %id, cancelled_run = cancelled, "Stop requested");
        Ok(task)
    }

    pub async fn detail(&self, id: Uuid) -> DomainResult<TaskDetail> {
        let task = self.get_task(id).await?;
        let cases = self.case_repo.list_for_task(id).await?;
        Ok(TaskDetail { task, cases })
    }

    /// One page of tasks plus the total matching count.
    pub async fn list(&self, filters: TaskFilters) -> DomainResult<(Vec<Task>, i64)> {
        let total = self.task_repo.count(filters.clone()).await?;
        let tasks = self.task_repo.list(filters).await?;
        Ok((tasks, total))
    }

    async fn get_task(&self, id: Uuid) -> DomainResult<Task> {
        self.task_repo.get(id).await?.ok_or(DomainError::TaskNotFound(id))
    }
}
