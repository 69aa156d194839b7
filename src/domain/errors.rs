//! Domain errors for the Redline hardening engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while driving a hardening run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A tool could not compile, execute or produce its required output.
    #[error("{tool} failed: {reason}")]
    ToolFatal { tool: &'static str, reason: String },

    #[error("{tool} did not finish within {secs}s")]
    ToolTimeout { tool: &'static str, secs: u64 },

    /// An LLM-backed generator call failed (network, quota, malformed response).
    #[error("{tool} degraded: {reason}")]
    GeneratorDegraded { tool: &'static str, reason: String },

    #[error("Workspace error: {0}")]
    WorkspaceError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn tool_fatal(tool: &'static str, reason: impl Into<String>) -> Self {
        Self::ToolFatal { tool, reason: reason.into() }
    }

    pub fn degraded(tool: &'static str, reason: impl Into<String>) -> Self {
        Self::GeneratorDegraded { tool, reason: reason.into() }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolFatal { .. } | Self::ToolTimeout { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::SerializationError(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::WorkspaceError(err.to_string())
    }
}
