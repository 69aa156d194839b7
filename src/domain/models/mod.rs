//! Domain models for the hardening engine.

pub mod config;
pub mod exploit_case;
pub mod round;
pub mod task;
pub mod termination;
pub mod tooling;

pub use config::{
    Config, DatabaseConfig, EngineConfig, LlmConfig, LogFormat, LoggingConfig, RotationPolicy,
    StorageConfig, ToolchainConfig, WeaponizeFailurePolicy,
};
pub use exploit_case::{
    case_name_for_routine, fuzz_case_name, fuzz_routine_name, CaseOrigin, CaseStatus, ExploitCase, RoutineOutcome,
    VersionTag,
};
pub use round::{ContextUpdate, ExecutionStatus, RoundContext, RunVerdict};
pub use task::{FuzzerSummary, Task, TaskStatus};
pub use termination::{Route, TerminationPolicy, DEFAULT_MAX_ROUNDS};
pub use tooling::{FuzzOutcome, FuzzReport, FuzzStats, RegressionReport};
