//! Round engine: the adversarial hardening state machine.
//!
//! One run advances a single task through rounds of
//!
//! ```text
//! Discovery -> Weaponize -> Gatekeeper -> Router -+-> terminate
//!     ^                                           |
//!     +------------- Regression <- Fix <----------+
//! ```
//!
//! Each node is a method returning a [`ContextUpdate`]; the driver merges
//! it into the [`RoundContext`] and checks the cancellation token before
//! starting the next node. Tool calls are the only suspension points and
//! each is bounded by the configured tool timeout.

mod discovery;
mod fix;
mod gatekeeper;
mod regression;
mod weaponize;

pub use gatekeeper::GateDecision;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::workspace::WorkspaceRoot;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EngineConfig, Route, RoundContext, RunVerdict, TerminationPolicy};
use crate::domain::ports::{
    ExploitCaseRepository, ExploitGenerator, FuzzExecutor, PatchGenerator, RegressionRunner, StaticAnalyzer,
    TaskRepository,
};

/// The five external tools a run calls.
#[derive(Clone)]
pub struct ToolSet {
    pub analyzer: Arc<dyn StaticAnalyzer>,
    pub fuzzer: Arc<dyn FuzzExecutor>,
    pub exploit_generator: Arc<dyn ExploitGenerator>,
    pub patch_generator: Arc<dyn PatchGenerator>,
    pub regression_runner: Arc<dyn RegressionRunner>,
}

pub struct RoundEngine<T: TaskRepository, C: ExploitCaseRepository> {
    tasks: Arc<T>,
    cases: Arc<C>,
    tools: ToolSet,
    workspace: WorkspaceRoot,
    policy: TerminationPolicy,
    config: EngineConfig,
}

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    pub fn new(tasks: Arc<T>, cases: Arc<C>, tools: ToolSet, workspace: WorkspaceRoot, config: EngineConfig) -> Self {
        Self {
            tasks,
            cases,
            tools,
            workspace,
            policy: TerminationPolicy::new(config.max_rounds),
            config,
        }
    }

    pub fn policy(&self) -> &TerminationPolicy {
        &self.policy
    }

    /// Drive a task to a verdict.
    ///
    /// Errors never escape: a fatal tool failure or a failed read of the
    /// ledger becomes a [`RunVerdict::ToolFailure`].
    #[tracing::instrument(skip(self, ctx, cancel), fields(task_id = %ctx.task_id))]
    pub async fn run(&self, mut ctx: RoundContext, cancel: &CancellationToken) -> RunVerdict {
        let verdict = match self.drive(&mut ctx, cancel).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(task_id = %ctx.task_id, round = ctx.round_count, error = %e, "Run aborted");
                RunVerdict::ToolFailure { reason: e.to_string() }
            }
        };
        info!(
            task_id = %ctx.task_id,
            rounds = ctx.round_count,
            verdict = verdict.execution_status().as_str(),
            "Run finished"
        );
        verdict
    }

    async fn drive(&self, ctx: &mut RoundContext, cancel: &CancellationToken) -> DomainResult<RunVerdict> {
        self.workspace.for_task(ctx.task_id).prepare().await?;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.stopped(ctx));
            }
            info!(task_id = %ctx.task_id, version = %ctx.version(), "Round started");
            let update = self.discover(ctx).await?;
            ctx.apply(update);

            if cancel.is_cancelled() {
                return Ok(self.stopped(ctx));
            }
            let update = self.weaponize(ctx).await?;
            ctx.apply(update);

            if cancel.is_cancelled() {
                return Ok(self.stopped(ctx));
            }
            let decision = self.gatekeep(ctx).await?;
            ctx.apply(decision.update());

            match self.policy.route(decision.status, ctx.round_count, decision.active_reds) {
                Route::Terminate(verdict) => return Ok(verdict),
                Route::Fix => {}
            }

            if cancel.is_cancelled() {
                return Ok(self.stopped(ctx));
            }
            let update = self.fix(ctx).await?;
            ctx.apply(update);

            if cancel.is_cancelled() {
                return Ok(self.stopped(ctx));
            }
            let update = self.regress(ctx).await?;
            ctx.apply(update);
        }
    }

    fn stopped(&self, ctx: &RoundContext) -> RunVerdict {
        info!(task_id = %ctx.task_id, round = ctx.round_count, "Stop requested; ending run at node boundary");
        RunVerdict::Stopped { rounds: ctx.round_count }
    }

    /// Await a tool call under the configured timeout.
    async fn call_tool<R>(
        &self,
        tool: &'static str,
        call: impl Future<Output = DomainResult<R>>,
    ) -> DomainResult<R> {
        let secs = self.config.tool_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool, secs, "Tool call timed out");
                Err(DomainError::ToolTimeout { tool, secs })
            }
        }
    }

    /// Apply a ledger or task write; failures are logged and the round goes on.
    async fn persist(&self, task_id: Uuid, operation: &'static str, write: impl Future<Output = DomainResult<()>>) {
        if let Err(e) = write.await {
            warn!(task_id = %task_id, operation, error = %e, "Persistence failed; continuing round");
        }
    }

    async fn set_phase(&self, task_id: Uuid, phase: String) {
        self.persist(task_id, "update_phase", self.tasks.update_phase(task_id, &phase)).await;
    }
}
