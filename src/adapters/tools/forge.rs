//! Foundry test runner adapter and `forge test --json` parsing.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use super::docker::{DockerRunner, ProcessOutput};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{case_name_for_routine, RegressionReport, RoutineOutcome, ToolchainConfig};
use crate::domain::ports::RegressionRunner;

const COMPILE_ERROR_MARKERS: [&str; 3] = ["Compilation failed", "Error:", "ParserError"];

#[derive(Debug, Error)]
pub enum ForgeOutputError {
    #[error("Compilation failed: {0}")]
    CompileFailed(String),
    #[error("forge exited without a JSON report: {0}")]
    NoReport(String),
    #[error("Malformed forge JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Slice the outermost JSON object out of noisy stdout.
pub fn extract_json(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    (end > start).then(|| &stdout[start..=end])
}

/// Strip the argument list from a routine signature (`testX()` -> `testX`).
pub fn normalize_routine_name(name: &str) -> &str {
    name.split_once('(').map_or(name, |(head, _)| head).trim()
}

/// Flatten `file -> test_results -> routine -> status` into case outcomes.
///
/// Routines reported with any status other than `Success`/`Failure`
/// (e.g. skipped) are left out. Fuzz replay routines are reported under
/// their case name. A name reported by several files is `Success` if any
/// of them succeeded.
pub fn parse_test_report(output: &ProcessOutput) -> Result<RegressionReport, ForgeOutputError> {
    let Some(json) = extract_json(&output.stdout) else {
        let combined = output.combined();
        if COMPILE_ERROR_MARKERS.iter().any(|m| combined.contains(m)) {
            return Err(ForgeOutputError::CompileFailed(tail(&combined)));
        }
        if output.success {
            return Ok(RegressionReport::new());
        }
        return Err(ForgeOutputError::NoReport(tail(&combined)));
    };

    let data: Value = serde_json::from_str(json)?;
    let mut report = RegressionReport::new();

    let Some(files) = data.as_object() else {
        return Ok(report);
    };
    for file in files.values() {
        let Some(results) = file.get("test_results").and_then(Value::as_object) else {
            continue;
        };
        for (routine, result) in results {
            let outcome = match result.get("status").and_then(Value::as_str) {
                Some("Success") => RoutineOutcome::Success,
                Some("Failure") => RoutineOutcome::Failure,
                _ => continue,
            };
            let name = case_name_for_routine(normalize_routine_name(routine));
            report
                .entry(name.to_string())
                .and_modify(|seen| {
                    if outcome == RoutineOutcome::Success {
                        *seen = RoutineOutcome::Success;
                    }
                })
                .or_insert(outcome);
        }
    }
    Ok(report)
}

fn tail(output: &str) -> String {
    const MAX: usize = 2000;
    let trimmed = output.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

/// RegressionRunner backed by `forge test --json` in the Foundry image.
pub struct ForgeRegressionRunner {
    docker: DockerRunner,
    image: String,
    remapping: String,
}

impl ForgeRegressionRunner {
    pub fn new(docker: DockerRunner, toolchain: &ToolchainConfig) -> Self {
        Self {
            docker,
            image: toolchain.foundry_image.clone(),
            remapping: toolchain.forge_std_remapping.clone(),
        }
    }
}

#[async_trait]
impl RegressionRunner for ForgeRegressionRunner {
    fn name(&self) -> &'static str {
        "regression runner"
    }

    async fn run(&self, workdir: &Path, name_pattern: &str) -> DomainResult<RegressionReport> {
        let command = format!(
            "forge test --json --match-path '{name_pattern}' --remappings {}",
            self.remapping
        );
        let output = self.docker.run(self.name(), &self.image, workdir, &command).await?;

        let report = parse_test_report(&output).map_err(|e| DomainError::tool_fatal(self.name(), e.to_string()))?;
        tracing::debug!(pattern = name_pattern, routines = report.len(), "Parsed forge report");
        Ok(report)
    }
}
