//! Redline - adversarial smart-contract hardening
//!
//! Redline drives a contract source through repeated rounds of discovery
//! (static analysis and fuzzing), weaponization (generated exploits verified
//! by execution), patching and full-matrix regression until no exploit
//! succeeds or the round budget runs out.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, termination policy, errors and port traits
//! - **Adapters** (`adapters`): SQLite repositories, task workspaces and tool adapters
//! - **Service Layer** (`services`): Round engine, task runner, scheduler and task control
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    CaseOrigin, CaseStatus, Config, ExploitCase, RoundContext, RunVerdict, Task, TaskStatus, TerminationPolicy,
};
pub use domain::ports::{ExploitCaseRepository, TaskFilters, TaskRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ExecutionScheduler, HardeningRunner, RoundEngine, TaskService, ToolSet};
