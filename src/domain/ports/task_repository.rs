//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FuzzerSummary, Task, TaskStatus};

/// Filters for listing tasks.
#[derive(Default, Debug, Clone)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Repository port for task rows.
///
/// The targeted update methods touch only the columns their phase owns, so
/// an external stop written to `status` is never clobbered by the engine.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Overwrite the whole row.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// List tasks, newest first.
    async fn list(&self, filters: TaskFilters) -> DomainResult<Vec<Task>>;

    /// Count tasks matching filters (pagination is ignored).
    async fn count(&self, filters: TaskFilters) -> DomainResult<i64>;

    /// Set the human-readable phase label.
    async fn update_phase(&self, id: Uuid, phase: &str) -> DomainResult<()>;

    /// Store the latest static report (even when empty) and fuzzer summary.
    async fn record_discovery(
        &self,
        id: Uuid,
        static_report: &str,
        fuzzer: Option<&FuzzerSummary>,
    ) -> DomainResult<()>;

    /// Store the latest generated exploit text.
    async fn record_exploit(&self, id: Uuid, exploit: &str) -> DomainResult<()>;

    /// Store a patch as the new current/fixed source and advance the round.
    async fn record_patch(&self, id: Uuid, patched: &str, round_count: u32) -> DomainResult<()>;

    /// Write the final status and summary of a run.
    ///
    /// Only applies while the row is still `running` or already has the
    /// target status; returns `false` when the row was moved elsewhere (e.g.
    /// stopped externally before a completed verdict) in the meantime.
    async fn finish(&self, id: Uuid, status: TaskStatus, summary: &str) -> DomainResult<bool>;
}
