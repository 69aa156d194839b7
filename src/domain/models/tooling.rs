//! Typed results returned by the tool adapter ports.

use std::collections::HashMap;
use std::path::PathBuf;

use super::exploit_case::RoutineOutcome;

/// Overall outcome reported by the fuzz executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzOutcome {
    Passed,
    Failed,
    /// The executor itself errored; the payload is its error text.
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzStats {
    pub runs: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzReport {
    pub outcome: FuzzOutcome,
    /// Missing when the tool produced an error payload instead of statistics
    pub stats: Option<FuzzStats>,
    /// Replay of the failure, if one could be built
    pub evidence_path: Option<PathBuf>,
}

impl FuzzReport {
    pub fn passed(runs: u64) -> Self {
        Self {
            outcome: FuzzOutcome::Passed,
            stats: Some(FuzzStats { runs, failures: 0 }),
            evidence_path: None,
        }
    }

    pub fn crashed(runs: u64, failures: u64, evidence_path: impl Into<PathBuf>) -> Self {
        Self {
            outcome: FuzzOutcome::Failed,
            stats: Some(FuzzStats { runs, failures }),
            evidence_path: Some(evidence_path.into()),
        }
    }

    /// A failure the executor could not turn into replayable evidence.
    pub fn crashed_unreproduced(runs: u64, failures: u64) -> Self {
        Self {
            outcome: FuzzOutcome::Failed,
            stats: Some(FuzzStats { runs, failures }),
            evidence_path: None,
        }
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        Self {
            outcome: FuzzOutcome::Error(message.into()),
            stats: None,
            evidence_path: None,
        }
    }

    /// Why this report means the fuzzer could not execute, if it does.
    ///
    /// A run count of zero without a pass is indistinguishable from a broken
    /// tool.
    pub fn execution_failure(&self) -> Option<String> {
        match (&self.outcome, self.stats) {
            (FuzzOutcome::Error(message), None) => Some(format!("Fuzzer critical failure: {message}")),
            (_, None) => Some("Fuzzer returned no statistics".to_string()),
            (FuzzOutcome::Passed, Some(_)) => None,
            (_, Some(stats)) if stats.runs == 0 => {
                Some("Fuzzer failed to run (compilation error likely)".to_string())
            }
            _ => None,
        }
    }
}

/// Routine name to outcome, as reported by one regression run.
pub type RegressionReport = HashMap<String, RoutineOutcome>;
