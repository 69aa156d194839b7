use tracing::{info, warn};

use super::RoundEngine;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{fuzz_case_name, CaseOrigin, ContextUpdate, ExploitCase, FuzzerSummary, RoundContext};
use crate::domain::ports::{ExploitCaseRepository, TaskRepository};

impl<T, C> RoundEngine<T, C>
where
    T: TaskRepository + 'static,
    C: ExploitCaseRepository + 'static,
{
    /// Static scan plus a fuzz pass over the current source.
    ///
    /// Resets the round's threat counter to the number of new fuzz crashes
    /// (0 or 1). A fuzzer that could not execute aborts the run before
    /// anything is written to the matrix.
    pub async fn discover(&self, ctx: &RoundContext) -> DomainResult<ContextUpdate> {
        let task_id = ctx.task_id;
        let version = ctx.version();
        let ws = self.workspace.for_task(task_id);
        self.set_phase(task_id, format!("Discovery ({version})")).await;

        let analyzer = &self.tools.analyzer;
        let report = self
            .call_tool(analyzer.name(), analyzer.scan(ws.dir(), &ctx.current_source, &version))
            .await?;
        info!(task_id = %task_id, %version, findings = !report.trim().is_empty(), "Static scan complete");
        self.persist(task_id, "record_discovery", self.tasks.record_discovery(task_id, &report, None))
            .await;

        let target = ws.write_target(&ctx.current_source).await?;
        let fuzzer = &self.tools.fuzzer;
        let fuzz = self
            .call_tool(fuzzer.name(), fuzzer.run(ws.dir(), &target, ctx.round_count))
            .await?;

        if let Some(reason) = fuzz.execution_failure() {
            return Err(DomainError::tool_fatal(fuzzer.name(), reason));
        }
        let stats = fuzz.stats.unwrap_or_default();
        info!(task_id = %task_id, %version, runs = stats.runs, failures = stats.failures, "Fuzz pass complete");

        let summary = FuzzerSummary::from_stats(stats.runs, stats.failures);
        self.persist(
            task_id,
            "record_discovery",
            self.tasks.record_discovery(task_id, &report, Some(&summary)),
        )
        .await;

        let mut new_threats = 0u32;
        if stats.failures > 0 {
            let evidence = match fuzz.evidence_path.as_deref() {
                Some(path) => ws.read(path).await.map_err(|e| e.to_string()),
                None => Err("no replayable evidence".to_string()),
            };
            match evidence {
                Ok(code) => {
                    let case = ExploitCase::confirmed(task_id, CaseOrigin::Fuzz, fuzz_case_name(&version), code, &version)
                        .with_description(format!("Fuzzer found {} failing run(s)", stats.failures));
                    if self.register_case(&case).await {
                        new_threats += 1;
                    }
                }
                // The crash is real even without a case to replay it
                Err(reason) => {
                    warn!(task_id = %task_id, %version, reason = %reason, "Fuzz crash not registered; counting it as new");
                    new_threats += 1;
                }
            }
        }

        Ok(ContextUpdate {
            static_report: Some(report),
            new_threats_count: Some(new_threats),
            ..Default::default()
        })
    }

    /// Register a case, returning whether it counts as a new finding.
    ///
    /// A failed write still counts: the finding exists even if the ledger
    /// missed it.
    pub(super) async fn register_case(&self, case: &ExploitCase) -> bool {
        match self.cases.register(case).await {
            Ok(true) => {
                info!(task_id = %case.task_id, name = %case.name, origin = case.origin.as_str(), "Registered exploit case");
                true
            }
            Ok(false) => {
                info!(task_id = %case.task_id, name = %case.name, "Exploit case already registered");
                false
            }
            Err(e) => {
                warn!(task_id = %case.task_id, name = %case.name, error = %e, "Failed to register exploit case");
                true
            }
        }
    }
}
