//! Matrix store port.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseStatus, ExploitCase};

/// Durable ledger of exploit cases, keyed by (task, name).
///
/// There is deliberately no delete: a case lives as long as its task.
#[async_trait]
pub trait ExploitCaseRepository: Send + Sync {
    /// Register a case. Returns `false` without writing when the task
    /// already has a case with that name.
    async fn register(&self, case: &ExploitCase) -> DomainResult<bool>;

    async fn get_by_name(&self, task_id: Uuid, name: &str) -> DomainResult<Option<ExploitCase>>;

    /// All cases of a task in registration order.
    async fn list_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ExploitCase>>;

    /// Cases with the given status in registration order, optionally capped.
    async fn list_by_status(
        &self,
        task_id: Uuid,
        status: CaseStatus,
        limit: Option<usize>,
    ) -> DomainResult<Vec<ExploitCase>>;

    async fn count_by_status(&self, task_id: Uuid, status: CaseStatus) -> DomainResult<u64>;

    /// Set statuses for the named cases in one transaction. Names with no
    /// matching case are ignored. Returns the number of rows updated.
    async fn apply_statuses(
        &self,
        task_id: Uuid,
        statuses: &HashMap<String, CaseStatus>,
    ) -> DomainResult<usize>;
}
