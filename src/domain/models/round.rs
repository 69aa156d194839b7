//! Round-scoped state carried between engine nodes.
//!
//! A `RoundContext` lives for one engine run. Nodes never mutate it
//! directly: each returns a `ContextUpdate` holding only the fields it
//! changed, and the engine driver merges it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::exploit_case::VersionTag;
use super::task::{Task, TaskStatus};

/// Status computed by the gatekeeper, or the terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    NeedsFix,
    Secure,
    Stopped,
    FailTimeout,
    FailError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::NeedsFix => "needs_fix",
            Self::Secure => "secure",
            Self::Stopped => "stopped",
            Self::FailTimeout => "fail_timeout",
            Self::FailError => "fail_error",
        }
    }
}

/// Cross-node state for one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundContext {
    pub task_id: Uuid,
    pub original_source: String,
    pub current_source: String,
    pub round_count: u32,
    /// Findings newly registered this round (reset by discovery)
    pub new_threats_count: u32,
    pub static_report: String,
    pub last_exploit: Option<String>,
    pub execution_status: ExecutionStatus,
}

impl RoundContext {
    pub fn new(task_id: Uuid, original_source: impl Into<String>) -> Self {
        let original_source = original_source.into();
        Self {
            task_id,
            current_source: original_source.clone(),
            original_source,
            round_count: 0,
            new_threats_count: 0,
            static_report: String::new(),
            last_exploit: None,
            execution_status: ExecutionStatus::Running,
        }
    }

    /// Build the context from a persisted task row, resuming from its
    /// current source and round counter.
    pub fn from_task(task: &Task) -> Option<Self> {
        let original = task.original_source.clone()?;
        let current = task.current_source.clone().unwrap_or_else(|| original.clone());
        Some(Self {
            task_id: task.id,
            original_source: original,
            current_source: current,
            round_count: task.round_count,
            new_threats_count: 0,
            static_report: task.static_report.clone().unwrap_or_default(),
            last_exploit: task.exploit_source.clone(),
            execution_status: ExecutionStatus::Running,
        })
    }

    pub fn version(&self) -> VersionTag {
        VersionTag::for_round(self.round_count)
    }

    /// Merge a node's changes into the context.
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(source) = update.current_source {
            self.current_source = source;
        }
        if let Some(round_count) = update.round_count {
            self.round_count = round_count;
        }
        if let Some(count) = update.new_threats_count {
            self.new_threats_count = count;
        }
        if let Some(report) = update.static_report {
            self.static_report = report;
        }
        if let Some(exploit) = update.last_exploit {
            self.last_exploit = Some(exploit);
        }
        if let Some(status) = update.execution_status {
            self.execution_status = status;
        }
    }
}

/// Fields changed by a single node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub current_source: Option<String>,
    pub round_count: Option<u32>,
    pub new_threats_count: Option<u32>,
    pub static_report: Option<String>,
    pub last_exploit: Option<String>,
    pub execution_status: Option<ExecutionStatus>,
}

/// Final outcome of an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunVerdict {
    /// No active reds and no new findings.
    Secure { rounds: u32 },
    /// Round budget ran out with work left.
    Exhausted { rounds: u32, active_reds: u64 },
    /// Cooperative stop observed at a node boundary.
    Stopped { rounds: u32 },
    /// A tool failed unrecoverably or the run hit a system error.
    ToolFailure { reason: String },
}

impl RunVerdict {
    pub fn task_status(&self) -> TaskStatus {
        match self {
            Self::Secure { .. } => TaskStatus::Completed,
            Self::Stopped { .. } => TaskStatus::Stopped,
            Self::Exhausted { .. } | Self::ToolFailure { .. } => TaskStatus::Failed,
        }
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        match self {
            Self::Secure { .. } => ExecutionStatus::Secure,
            Self::Exhausted { .. } => ExecutionStatus::FailTimeout,
            Self::Stopped { .. } => ExecutionStatus::Stopped,
            Self::ToolFailure { .. } => ExecutionStatus::FailError,
        }
    }

    /// Human-readable result summary stored on the task.
    pub fn summary(&self) -> String {
        match self {
            Self::Secure { .. } => "All threats mitigated. Contract is secure.".to_string(),
            Self::Exhausted { .. } => "Vulnerabilities persist after repair attempts.".to_string(),
            Self::Stopped { .. } => "Task stopped during execution.".to_string(),
            Self::ToolFailure { reason } => format!("System error: {reason}"),
        }
    }
}
