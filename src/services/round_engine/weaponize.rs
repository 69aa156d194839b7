use tracing::{info, warn};
use uuid::Uuid;

use super::RoundEngine;
use crate::adapters::workspace::TaskWorkspace;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CaseOrigin, ContextUpdate, ExploitCase, RoundContext, RoutineOutcome, WeaponizeFailurePolicy,
};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};

/// Stored in place of an exploit when the generator is unavailable.
pub const EXPLOIT_PLACEHOLDER: &str = "// Exploit generation failed";

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    /// Generate attack routines and keep the ones that work.
    ///
    /// The candidate is run alone against the current source. Routines whose
    /// assertions succeed are confirmed and registered as adversarial cases;
    /// the rest are discarded.
    pub async fn weaponize(&self, ctx: &RoundContext) -> DomainResult<ContextUpdate> {
        let task_id = ctx.task_id;
        let version = ctx.version();
        let ws = self.workspace.for_task(task_id);
        self.set_phase(task_id, format!("Weaponize ({version})")).await;

        let generator = &self.tools.exploit_generator;
        let exploit = match self
            .call_tool(generator.name(), generator.generate(&ctx.current_source, &ctx.static_report))
            .await
        {
            Ok(code) => code,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(task_id = %task_id, %version, error = %e, "Exploit generation degraded; skipping pre-validation");
                self.persist(task_id, "record_exploit", self.tasks.record_exploit(task_id, EXPLOIT_PLACEHOLDER))
                    .await;
                return Ok(ContextUpdate {
                    last_exploit: Some(EXPLOIT_PLACEHOLDER.to_string()),
                    ..Default::default()
                });
            }
        };

        ws.write_target(&ctx.current_source).await?;
        let candidate = ws.write_candidate(&version, &exploit).await?;

        let runner = &self.tools.regression_runner;
        let results = match self.call_tool(runner.name(), runner.run(ws.dir(), &candidate)).await {
            Ok(results) => results,
            Err(e @ DomainError::ToolFatal { .. })
                if self.config.weaponize_failure == WeaponizeFailurePolicy::SkipRound =>
            {
                warn!(task_id = %task_id, %version, error = %e, "Exploit candidate failed to run; skipping");
                Default::default()
            }
            Err(e) => {
                self.discard_candidate(task_id, &ws, &candidate).await;
                return Err(e);
            }
        };

        let mut routines: Vec<_> = results.into_iter().collect();
        routines.sort_by(|a, b| a.0.cmp(&b.0));

        let mut confirmed = 0u32;
        for (name, outcome) in routines {
            match outcome {
                RoutineOutcome::Success => {
                    let case = ExploitCase::confirmed(task_id, CaseOrigin::Adversarial, &name, &exploit, &version)
                        .with_description(format!("Verified exploit from {version}"));
                    if self.register_case(&case).await {
                        confirmed += 1;
                    }
                }
                RoutineOutcome::Failure => {
                    info!(task_id = %task_id, routine = %name, "Discarding ineffective exploit routine");
                }
            }
        }

        if confirmed > 0 {
            if let Err(e) = ws.save_exploit(&version, &exploit).await {
                warn!(task_id = %task_id, error = %e, "Failed to keep exploit artifact");
            }
        }
        self.discard_candidate(task_id, &ws, &candidate).await;
        self.persist(task_id, "record_exploit", self.tasks.record_exploit(task_id, &exploit)).await;

        let new_threats = ctx.new_threats_count + confirmed;
        info!(task_id = %task_id, %version, confirmed, new_threats, "Weaponize complete");

        Ok(ContextUpdate {
            new_threats_count: Some(new_threats),
            last_exploit: Some(exploit),
            ..Default::default()
        })
    }

    async fn discard_candidate(&self, task_id: Uuid, ws: &TaskWorkspace, candidate: &str) {
        if let Err(e) = ws.remove(candidate).await {
            warn!(task_id = %task_id, candidate, error = %e, "Failed to remove exploit candidate");
        }
    }
}
