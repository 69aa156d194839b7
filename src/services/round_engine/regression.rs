use std::collections::HashMap;
use tracing::info;

use super::RoundEngine;
use crate::adapters::workspace::MATRIX_PATTERN;
use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseStatus, ContextUpdate, RoundContext};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    /// Re-run the entire matrix against the patched source.
    ///
    /// Cases the runner reports on flip to FAILING (attack still works) or
    /// PASSING (defense held). Cases absent from the report keep their
    /// status.
    pub async fn regress(&self, ctx: &RoundContext) -> DomainResult<ContextUpdate> {
        let task_id = ctx.task_id;
        let version = ctx.version();
        let ws = self.workspace.for_task(task_id);
        self.set_phase(task_id, format!("Regression ({version})")).await;

        ws.write_target(&ctx.current_source).await?;
        let cases = self.cases.list_for_task(task_id).await?;
        let staged = ws.stage_matrix(&cases).await?;

        let runner = &self.tools.regression_runner;
        let results = self.call_tool(runner.name(), runner.run(ws.dir(), MATRIX_PATTERN)).await?;

        let statuses: HashMap<String, CaseStatus> = cases
            .iter()
            .filter_map(|case| {
                results
                    .get(&case.name)
                    .map(|outcome| (case.name.clone(), CaseStatus::from_attack_outcome(*outcome)))
            })
            .collect();

        let red = statuses.values().filter(|s| **s == CaseStatus::Failing).count();
        let green = statuses.len() - red;
        let unreported = cases.len() - statuses.len();

        let write = async {
            self.cases.apply_statuses(task_id, &statuses).await.map(|_| ())
        };
        self.persist(task_id, "apply_statuses", write).await;

        info!(
            task_id = %task_id,
            %version,
            staged,
            green,
            red,
            unreported,
            "Regression complete"
        );

        Ok(ContextUpdate::default())
    }
}
