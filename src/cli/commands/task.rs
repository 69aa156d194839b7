//! Task CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteExploitCaseRepository, SqliteTaskRepository};
use crate::adapters::tools::{
    ChatClient, DockerRunner, FoundryFuzzer, ForgeRegressionRunner, LlmExploitGenerator, LlmPatchGenerator,
    SlitherAnalyzer,
};
use crate::adapters::workspace::WorkspaceRoot;
use crate::cli::output::{colorize_status, label, list_table, output, truncate, CommandOutput};
use crate::domain::models::{Config, ExploitCase, RunVerdict, Task, TaskStatus};
use crate::domain::ports::{TaskFilters, TaskRepository};
use crate::services::{ExecutionScheduler, HardeningRunner, RoundEngine, TaskDetail, TaskService, ToolSet};

const STOP_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new hardening task
    Create {
        /// Task name
        name: String,
    },
    /// Upload the contract source for a task
    Upload {
        /// Task ID
        task_id: Uuid,
        /// Path to the Solidity source
        file: PathBuf,
        /// Contract file name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the hardening loop for one or more tasks
    Run {
        /// Task IDs (comma-separated)
        #[arg(required = true, value_delimiter = ',')]
        task_ids: Vec<Uuid>,
    },
    /// Stop a task
    Stop {
        /// Task ID
        task_id: Uuid,
    },
    /// Show task details and its exploit matrix
    Show {
        /// Task ID
        task_id: Uuid,
        /// Include the current contract source
        #[arg(long)]
        source: bool,
    },
    /// List tasks
    List {
        /// Filter by status (created, uploaded, running, stopped, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
        /// Number of tasks to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub name: String,
    pub status: String,
    pub contract_name: Option<String>,
    pub current_phase: Option<String>,
    pub round_count: u32,
    pub result_summary: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl From<&Task> for TaskOutput {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            name: task.name.clone(),
            status: task.status.as_str().to_string(),
            contract_name: task.contract_name.clone(),
            current_phase: task.current_phase.clone(),
            round_count: task.round_count,
            result_summary: task.result_summary.clone(),
            created_at: task.created_at.to_rfc3339(),
            started_at: task.started_at.map(|t| t.to_rfc3339()),
            finished_at: task.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskActionOutput {
    pub success: bool,
    pub message: String,
    pub task: TaskOutput,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        format!("{}\n  {} {}\n  {} {}", self.message, label("ID"), self.task.id, label("Status"), colorize_status(&self.task.status))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
    pub total: i64,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }

        let mut table = list_table(&["id", "name", "status", "rounds", "phase", "created"]);
        for task in &self.tasks {
            table.add_row(vec![
                task.id[..8].to_string(),
                truncate(&task.name, 24),
                colorize_status(&task.status).to_string(),
                task.round_count.to_string(),
                truncate(task.current_phase.as_deref().unwrap_or("-"), 24),
                task.created_at[..19].replace('T', " "),
            ]);
        }
        format!("Showing {} of {} task(s):\n{table}", self.tasks.len(), self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CaseOutput {
    pub name: String,
    pub origin: String,
    pub status: String,
    pub version_added: String,
    pub description: Option<String>,
}

impl From<&ExploitCase> for CaseOutput {
    fn from(case: &ExploitCase) -> Self {
        Self {
            name: case.name.clone(),
            origin: case.origin.as_str().to_string(),
            status: case.status.as_str().to_string(),
            version_added: case.version_added.clone(),
            description: case.description.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskDetailOutput {
    pub task: TaskOutput,
    pub active_reds: usize,
    pub static_report: Option<String>,
    pub fuzzer_report: Option<serde_json::Value>,
    pub cases: Vec<CaseOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_source: Option<String>,
}

impl TaskDetailOutput {
    fn from_detail(detail: &TaskDetail, include_source: bool) -> Self {
        let task = &detail.task;
        Self {
            task: TaskOutput::from(task),
            active_reds: detail.active_reds(),
            static_report: task.static_report.clone().filter(|r| !r.is_empty()),
            fuzzer_report: task.fuzzer_report.as_ref().and_then(|r| serde_json::to_value(r).ok()),
            cases: detail.cases.iter().map(CaseOutput::from).collect(),
            current_source: if include_source { task.working_source().map(str::to_string) } else { None },
        }
    }
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let t = &self.task;
        let mut lines = vec![
            format!("{} {}", label("Task"), t.id),
            format!("{} {}", label("Name"), t.name),
            format!("{} {}", label("Status"), colorize_status(&t.status)),
            format!("{} {}", label("Contract"), t.contract_name.as_deref().unwrap_or("-")),
            format!("{} {}", label("Phase"), t.current_phase.as_deref().unwrap_or("-")),
            format!("{} {}", label("Rounds"), t.round_count),
        ];
        if let Some(summary) = &t.result_summary {
            lines.push(format!("{} {summary}", label("Result")));
        }
        if let Some(fuzz) = &self.fuzzer_report {
            lines.push(format!("{} {fuzz}", label("Fuzzer")));
        }

        if self.cases.is_empty() {
            lines.push("\nNo exploit cases registered.".to_string());
        } else {
            lines.push(format!("\nExploit matrix ({} active red):", self.active_reds));
            let mut table = list_table(&["name", "origin", "status", "added", "description"]);
            for case in &self.cases {
                table.add_row(vec![
                    case.name.clone(),
                    case.origin.clone(),
                    colorize_status(&case.status).to_string(),
                    case.version_added.clone(),
                    truncate(case.description.as_deref().unwrap_or(""), 40),
                ]);
            }
            lines.push(table.to_string());
        }

        if let Some(report) = &self.static_report {
            lines.push(format!("\n{report}"));
        }
        if let Some(source) = &self.current_source {
            lines.push(format!("\n{}\n{source}", label("Current source")));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunResult {
    pub task_id: String,
    pub status: String,
    pub rounds: Option<u32>,
    pub summary: String,
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub results: Vec<RunResult>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["task", "status", "rounds", "summary"]);
        for r in &self.results {
            table.add_row(vec![
                r.task_id[..8].to_string(),
                colorize_status(&r.status).to_string(),
                r.rounds.map_or_else(|| "-".to_string(), |n| n.to_string()),
                r.summary.clone(),
            ]);
        }
        table.to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

type SqliteTaskService = TaskService<SqliteTaskRepository, SqliteExploitCaseRepository>;

struct TaskContext {
    tasks: Arc<SqliteTaskRepository>,
    cases: Arc<SqliteExploitCaseRepository>,
    workspace: WorkspaceRoot,
    service: SqliteTaskService,
}

impl TaskContext {
    async fn open(config: &Config) -> Result<Self> {
        let pool = initialize_database(&config.database.url(), Some(PoolConfig::from(&config.database)))
            .await
            .context("Failed to initialize database. Run 'redline init' first.")?;
        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let cases = Arc::new(SqliteExploitCaseRepository::new(pool));
        let workspace = WorkspaceRoot::new(&config.storage.root);
        let service = TaskService::new(Arc::clone(&tasks), Arc::clone(&cases), workspace.clone());
        Ok(Self { tasks, cases, workspace, service })
    }
}

pub async fn execute(args: TaskArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = TaskContext::open(config).await?;

    match args.command {
        TaskCommands::Create { name } => {
            let task = ctx.service.create(&name).await?;
            let out = TaskActionOutput {
                success: true,
                message: "Task created.".to_string(),
                task: TaskOutput::from(&task),
            };
            output(&out, json_mode);
        }
        TaskCommands::Upload { task_id, file, name } => {
            let source = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let contract_name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("Source path has no file name")?,
            };
            let task = ctx.service.upload_source(task_id, &contract_name, &source).await?;
            let out = TaskActionOutput {
                success: true,
                message: format!("Uploaded {contract_name} ({} bytes).", source.len()),
                task: TaskOutput::from(&task),
            };
            output(&out, json_mode);
        }
        TaskCommands::Run { task_ids } => {
            let out = run_tasks(&ctx, config, task_ids).await?;
            output(&out, json_mode);
        }
        TaskCommands::Stop { task_id } => {
            let task = ctx.service.request_stop(task_id, None).await?;
            let out = TaskActionOutput {
                success: true,
                message: "Stop requested.".to_string(),
                task: TaskOutput::from(&task),
            };
            output(&out, json_mode);
        }
        TaskCommands::Show { task_id, source } => {
            let detail = ctx.service.detail(task_id).await?;
            output(&TaskDetailOutput::from_detail(&detail, source), json_mode);
        }
        TaskCommands::List { status, limit, offset } => {
            let status = match status {
                Some(s) => Some(TaskStatus::from_str(&s).ok_or_else(|| anyhow::anyhow!("Invalid status: {s}"))?),
                None => None,
            };
            let filters = TaskFilters { status, limit: Some(limit), offset: Some(offset) };
            let (tasks, total) = ctx.service.list(filters).await?;
            let out = TaskListOutput { tasks: tasks.iter().map(TaskOutput::from).collect(), total };
            output(&out, json_mode);
        }
    }

    Ok(())
}

/// Wire the production tools: containerised analyzers plus the chat backend.
pub fn build_toolset(config: &Config) -> Result<ToolSet> {
    let docker = DockerRunner::new(
        config.toolchain.docker_binary.clone(),
        Duration::from_secs(config.engine.tool_timeout_secs),
    );
    let chat = Arc::new(ChatClient::new(&config.llm).context("Failed to build LLM client")?);
    if config.llm.resolve_api_key().is_none() {
        warn!("No LLM API key configured; exploit and patch generation will degrade");
    }

    Ok(ToolSet {
        analyzer: Arc::new(SlitherAnalyzer::new(docker.clone(), &config.toolchain)),
        fuzzer: Arc::new(FoundryFuzzer::new(docker.clone(), &config.toolchain)),
        exploit_generator: Arc::new(LlmExploitGenerator::new(Arc::clone(&chat), &config.llm)),
        patch_generator: Arc::new(LlmPatchGenerator::new(chat, &config.llm)),
        regression_runner: Arc::new(ForgeRegressionRunner::new(docker, &config.toolchain)),
    })
}

async fn run_tasks(ctx: &TaskContext, config: &Config, task_ids: Vec<Uuid>) -> Result<RunOutput> {
    let mut seen = HashSet::new();
    let task_ids: Vec<Uuid> = task_ids.into_iter().filter(|id| seen.insert(*id)).collect();

    let engine = Arc::new(RoundEngine::new(
        Arc::clone(&ctx.tasks),
        Arc::clone(&ctx.cases),
        build_toolset(config)?,
        ctx.workspace.clone(),
        config.engine.clone(),
    ));
    let runner = HardeningRunner::new(Arc::clone(&ctx.tasks), engine);
    let scheduler = Arc::new(ExecutionScheduler::new(config.max_concurrent_tasks));

    let interrupt = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping runs");
                scheduler.shutdown();
            }
        })
    };
    let watcher = tokio::spawn(watch_external_stops(
        Arc::clone(&ctx.tasks),
        Arc::clone(&scheduler),
        task_ids.clone(),
    ));

    let mut results = Vec::with_capacity(task_ids.len());
    let mut handles = Vec::with_capacity(task_ids.len());
    for task_id in task_ids {
        let runner = runner.clone();
        match scheduler
            .submit(task_id, move |token| async move { runner.run(task_id, token).await })
            .await
        {
            Ok(handle) => handles.push(handle),
            Err(e) => results.push(RunResult {
                task_id: task_id.to_string(),
                status: "error".to_string(),
                rounds: None,
                summary: e.to_string(),
            }),
        }
    }

    let joined = join_all(handles.into_iter().map(|handle| {
        let task_id = handle.task_id();
        async move { (task_id, handle.join().await) }
    }))
    .await;

    for (task_id, outcome) in joined {
        let result = match outcome {
            Ok(Ok(verdict)) => verdict_result(task_id, &verdict),
            Ok(Err(e)) => RunResult {
                task_id: task_id.to_string(),
                status: "error".to_string(),
                rounds: None,
                summary: e.to_string(),
            },
            Err(e) => RunResult {
                task_id: task_id.to_string(),
                status: "error".to_string(),
                rounds: None,
                summary: e.to_string(),
            },
        };
        results.push(result);
    }

    interrupt.abort();
    watcher.abort();
    Ok(RunOutput { results })
}

fn verdict_result(task_id: Uuid, verdict: &RunVerdict) -> RunResult {
    let rounds = match verdict {
        RunVerdict::Secure { rounds } | RunVerdict::Exhausted { rounds, .. } | RunVerdict::Stopped { rounds } => {
            Some(*rounds)
        }
        RunVerdict::ToolFailure { .. } => None,
    };
    RunResult {
        task_id: task_id.to_string(),
        status: verdict.task_status().as_str().to_string(),
        rounds,
        summary: verdict.summary(),
    }
}

/// Bridge `redline task stop` issued from another process into this
/// process's cancellation tokens.
///
/// A run is cancelled once its row has been seen running and later reads
/// stopped. Rows that start out stopped are resumable and left alone.
async fn watch_external_stops<T: TaskRepository>(tasks: Arc<T>, scheduler: Arc<ExecutionScheduler>, task_ids: Vec<Uuid>) {
    let mut running = HashSet::new();
    let mut interval = tokio::time::interval(STOP_POLL_INTERVAL);
    loop {
        interval.tick().await;
        if scheduler.is_shutdown() {
            return;
        }
        for &task_id in &task_ids {
            if !scheduler.is_tracked(task_id).await {
                continue;
            }
            match tasks.get(task_id).await {
                Ok(Some(task)) if task.status == TaskStatus::Running => {
                    running.insert(task_id);
                }
                Ok(Some(task)) if task.status == TaskStatus::Stopped && running.contains(&task_id) => {
                    info!(task_id = %task_id, "Task stopped externally");
                    scheduler.cancel(task_id).await;
                }
                Ok(_) => {}
                Err(e) => warn!(task_id = %task_id, error = %e, "Failed to poll task status"),
            }
        }
    }
}
