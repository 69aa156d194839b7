//! Task domain model.
//!
//! A task is one hardening run over a single contract source. The row is
//! the persisted surface read by the API/UI layer while the engine works.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a hardening task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task row exists, no source yet
    Created,
    /// Contract source has been uploaded
    Uploaded,
    /// A round engine currently owns the task
    Running,
    /// Stopped by the user
    Stopped,
    /// Converged: no active reds and no new findings
    Completed,
    /// Round budget exhausted or a tool failed
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploaded => "uploaded",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(Self::Created),
            "uploaded" => Some(Self::Uploaded),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state for the current run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Created => vec![Self::Uploaded, Self::Stopped],
            Self::Uploaded => vec![Self::Running, Self::Stopped],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Stopped],
            // Stopped and failed runs resume from the persisted source and round
            Self::Stopped => vec![Self::Running],
            Self::Failed => vec![Self::Running],
            Self::Completed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Summary of the latest fuzzing pass, stored on the task for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzerSummary {
    pub total: u64,
    pub failures: u64,
    pub verdict: String,
}

impl FuzzerSummary {
    pub fn from_stats(runs: u64, failures: u64) -> Self {
        let verdict = if failures == 0 { "Secure" } else { "Vulnerable" };
        Self { total: runs, failures, verdict: verdict.to_string() }
    }
}

/// A hardening task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    /// File name of the uploaded contract
    pub contract_name: Option<String>,
    /// Uploaded source, immutable once set
    pub original_source: Option<String>,
    /// Source the next round starts from; replaced by each Fix
    pub current_source: Option<String>,
    /// Last patch produced, exposed for diffing
    pub fixed_source: Option<String>,
    /// Last exploit text produced by the generator
    pub exploit_source: Option<String>,
    /// Latest static-analysis report (may be empty)
    pub static_report: Option<String>,
    pub fuzzer_report: Option<FuzzerSummary>,
    /// Human-readable phase, for observability only
    pub current_phase: Option<String>,
    pub round_count: u32,
    pub result_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TaskStatus::Created,
            contract_name: None,
            original_source: None,
            current_source: None,
            fixed_source: None,
            exploit_source: None,
            static_report: None,
            fuzzer_report: None,
            current_phase: None,
            round_count: 0,
            result_summary: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach the uploaded contract source.
    ///
    /// The original source can only be set once.
    pub fn upload_source(
        &mut self,
        contract_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), String> {
        if self.original_source.is_some() {
            return Err("original source is already set".to_string());
        }
        self.transition_to(TaskStatus::Uploaded)?;
        let source = source.into();
        self.contract_name = Some(contract_name.into());
        self.current_source = Some(source.clone());
        self.original_source = Some(source);
        Ok(())
    }

    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;

        match new_status {
            TaskStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
                self.finished_at = None;
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Source the next round should start from.
    pub fn working_source(&self) -> Option<&str> {
        self.current_source
            .as_deref()
            .or(self.original_source.as_deref())
    }

    /// Wall-clock duration between start and finish (or now while running).
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}
