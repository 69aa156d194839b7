pub mod round_engine;
pub mod scheduler;
pub mod task_runner;
pub mod task_service;

pub use round_engine::{GateDecision, RoundEngine, ToolSet};
pub use scheduler::{ExecutionScheduler, RunHandle, SchedulerError};
pub use task_runner::HardeningRunner;
pub use task_service::{TaskDetail, TaskService};
