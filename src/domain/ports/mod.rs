//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - TaskRepository: task rows
//! - ExploitCaseRepository: the exploit matrix
//! - StaticAnalyzer, FuzzExecutor, ExploitGenerator, PatchGenerator,
//!   RegressionRunner: external analysis and generation tools

pub mod exploit_case_repository;
pub mod task_repository;
pub mod tools;

pub use exploit_case_repository::ExploitCaseRepository;
pub use task_repository::{TaskFilters, TaskRepository};
pub use tools::{ExploitGenerator, FuzzExecutor, PatchGenerator, RegressionRunner, StaticAnalyzer};
