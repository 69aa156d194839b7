//! Common test utilities for integration tests
//!
//! Provides a SQLite-backed harness with scripted tool fakes so engine
//! scenarios run without Docker or a model backend.

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use redline::adapters::sqlite::{create_migrated_test_pool, SqliteExploitCaseRepository, SqliteTaskRepository};
use redline::adapters::tools::{
    MockExploitGenerator, MockFuzzExecutor, MockPatchGenerator, MockRegressionRunner, MockStaticAnalyzer,
};
use redline::adapters::workspace::WorkspaceRoot;
use redline::domain::models::{CaseStatus, EngineConfig, Task};
use redline::domain::ports::ExploitCaseRepository;
use redline::services::{HardeningRunner, RoundEngine, TaskService, ToolSet};

pub type Engine = RoundEngine<SqliteTaskRepository, SqliteExploitCaseRepository>;
pub type Runner = HardeningRunner<SqliteTaskRepository, SqliteExploitCaseRepository>;

pub const VAULT_SOURCE: &str = "pragma solidity ^0.8.20;\ncontract Vault { mapping(address => uint) balances; }\n";
pub const PATCHED_SOURCE: &str = "pragma solidity ^0.8.20;\ncontract Vault { /* nonReentrant */ }\n";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn engine_config(max_rounds: u32) -> EngineConfig {
    EngineConfig { max_rounds, tool_timeout_secs: 30, ..EngineConfig::default() }
}

/// Database, workspace root and one scripted fake per tool port.
pub struct Harness {
    pub dir: TempDir,
    pub tasks: Arc<SqliteTaskRepository>,
    pub cases: Arc<SqliteExploitCaseRepository>,
    pub workspace: WorkspaceRoot,
    pub analyzer: Arc<MockStaticAnalyzer>,
    pub fuzzer: Arc<MockFuzzExecutor>,
    pub exploits: Arc<MockExploitGenerator>,
    pub patches: Arc<MockPatchGenerator>,
    pub runner: Arc<MockRegressionRunner>,
}

impl Harness {
    pub async fn new() -> Self {
        setup_test_logging();
        let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let workspace = WorkspaceRoot::new(dir.path());
        Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            cases: Arc::new(SqliteExploitCaseRepository::new(pool)),
            workspace,
            dir,
            analyzer: Arc::new(MockStaticAnalyzer::new()),
            fuzzer: Arc::new(MockFuzzExecutor::new()),
            exploits: Arc::new(MockExploitGenerator::new()),
            patches: Arc::new(MockPatchGenerator::new()),
            runner: Arc::new(MockRegressionRunner::new()),
        }
    }

    pub fn tools(&self) -> ToolSet {
        ToolSet {
            analyzer: self.analyzer.clone(),
            fuzzer: self.fuzzer.clone(),
            exploit_generator: self.exploits.clone(),
            patch_generator: self.patches.clone(),
            regression_runner: self.runner.clone(),
        }
    }

    pub fn engine_with(&self, tools: ToolSet, config: EngineConfig) -> Arc<Engine> {
        Arc::new(RoundEngine::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.cases),
            tools,
            self.workspace.clone(),
            config,
        ))
    }

    pub fn engine(&self, config: EngineConfig) -> Arc<Engine> {
        self.engine_with(self.tools(), config)
    }

    pub fn task_runner(&self, config: EngineConfig) -> Runner {
        HardeningRunner::new(Arc::clone(&self.tasks), self.engine(config))
    }

    pub fn service(&self) -> TaskService<SqliteTaskRepository, SqliteExploitCaseRepository> {
        TaskService::new(Arc::clone(&self.tasks), Arc::clone(&self.cases), self.workspace.clone())
    }

    /// A task with `source` uploaded, ready to run.
    pub async fn uploaded_task(&self, source: &str) -> Task {
        let service = self.service();
        let task = service.create("vault").await.expect("create task");
        service.upload_source(task.id, "Vault.sol", source).await.expect("upload source")
    }

    pub async fn task(&self, task: &Task) -> Task {
        use redline::domain::ports::TaskRepository;
        self.tasks.get(task.id).await.expect("read task").expect("task exists")
    }

    /// `(name, status)` of every case, in registration order.
    pub async fn matrix(&self, task: &Task) -> Vec<(String, CaseStatus)> {
        self.cases
            .list_for_task(task.id)
            .await
            .expect("list cases")
            .into_iter()
            .map(|c| (c.name, c.status))
            .collect()
    }
}
