use tracing::{info, warn};

use super::RoundEngine;
use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseStatus, ContextUpdate, ExploitCase, RoundContext};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};

/// Concatenate case evidence for the patch generator.
pub fn failing_evidence(cases: &[ExploitCase]) -> String {
    cases
        .iter()
        .map(|c| format!("// Exploit {}\n{}", c.name, c.code))
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    /// Ask for a patch against a sample of the active reds and advance the
    /// round counter. Never touches case status.
    pub async fn fix(&self, ctx: &RoundContext) -> DomainResult<ContextUpdate> {
        let task_id = ctx.task_id;
        let version = ctx.version();
        let next_round = ctx.round_count + 1;
        let next_version = version.next();
        let ws = self.workspace.for_task(task_id);
        self.set_phase(task_id, format!("Fix ({version})")).await;

        let sample = self
            .cases
            .list_by_status(task_id, CaseStatus::Failing, Some(self.config.fix_sample_size))
            .await?;
        let evidence = failing_evidence(&sample);

        let generator = &self.tools.patch_generator;
        let patched = match self
            .call_tool(generator.name(), generator.fix(&ctx.current_source, &ctx.static_report, &evidence))
            .await
        {
            Ok(patched) if !patched.trim().is_empty() => patched,
            Ok(_) => {
                warn!(task_id = %task_id, %version, "Patch generator returned nothing; keeping current source");
                ctx.current_source.clone()
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(task_id = %task_id, %version, error = %e, "Patch generation degraded; keeping current source");
                ctx.current_source.clone()
            }
        };

        if let Err(e) = ws.save_backup(&next_version, &patched).await {
            warn!(task_id = %task_id, error = %e, "Failed to write patch backup");
        }
        self.persist(task_id, "record_patch", self.tasks.record_patch(task_id, &patched, next_round))
            .await;

        info!(
            task_id = %task_id,
            sampled = sample.len(),
            changed = patched != ctx.current_source,
            round_count = next_round,
            "Fix complete"
        );

        Ok(ContextUpdate {
            current_source: Some(patched),
            round_count: Some(next_round),
            ..Default::default()
        })
    }
}
