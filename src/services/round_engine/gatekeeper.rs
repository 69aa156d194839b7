use tracing::info;

use super::RoundEngine;
use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseStatus, ContextUpdate, ExecutionStatus, RoundContext};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};

/// Gatekeeper output: the status plus the ledger count it was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub status: ExecutionStatus,
    pub active_reds: u64,
}

impl GateDecision {
    pub fn update(&self) -> ContextUpdate {
        ContextUpdate { execution_status: Some(self.status), ..Default::default() }
    }
}

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    /// Count active reds across the whole matrix and decide. No tool calls,
    /// no writes.
    pub async fn gatekeep(&self, ctx: &RoundContext) -> DomainResult<GateDecision> {
        let active_reds = self.cases.count_by_status(ctx.task_id, CaseStatus::Failing).await?;
        let status = self.policy.gatekeep(active_reds, ctx.new_threats_count);
        info!(
            task_id = %ctx.task_id,
            new_threats = ctx.new_threats_count,
            active_reds,
            status = status.as_str(),
            "Gatekeeper decision"
        );
        Ok(GateDecision { status, active_reds })
    }
}
