//! Scripted tool fakes for tests and dry runs.
//!
//! Each fake replays a queue of steps, one per call, then falls back to a
//! default step. Calls are recorded so tests can assert on what the engine
//! asked for.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FuzzReport, RegressionReport, RoutineOutcome, VersionTag};
use crate::domain::ports::{ExploitGenerator, FuzzExecutor, PatchGenerator, RegressionRunner, StaticAnalyzer};

/// One scripted reaction of a fake tool.
#[derive(Debug, Clone)]
pub enum MockStep<T> {
    Return(T),
    /// Fail with `ToolFatal`
    Fatal(String),
    /// Fail with `GeneratorDegraded`
    Degraded(String),
    /// Never answer (until cancelled by a timeout)
    Hang,
}

struct Script<T> {
    steps: Mutex<VecDeque<MockStep<T>>>,
    fallback: MockStep<T>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: MockStep<T>) -> Self {
        Self { steps: Mutex::new(VecDeque::new()), fallback }
    }

    async fn push(&self, step: MockStep<T>) {
        self.steps.lock().await.push_back(step);
    }

    async fn next(&self, tool: &'static str) -> DomainResult<T> {
        let step = self.steps.lock().await.pop_front().unwrap_or_else(|| self.fallback.clone());
        match step {
            MockStep::Return(value) => Ok(value),
            MockStep::Fatal(reason) => Err(DomainError::tool_fatal(tool, reason)),
            MockStep::Degraded(reason) => Err(DomainError::degraded(tool, reason)),
            MockStep::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DomainError::tool_fatal(tool, "hung"))
            }
        }
    }
}

/// Build a regression report from `(name, outcome)` pairs.
pub fn regression_report<'a>(entries: impl IntoIterator<Item = (&'a str, RoutineOutcome)>) -> RegressionReport {
    entries.into_iter().map(|(name, outcome)| (name.to_string(), outcome)).collect()
}

pub struct MockStaticAnalyzer {
    script: Script<String>,
    versions: Mutex<Vec<String>>,
}

impl MockStaticAnalyzer {
    /// Analyzer that reports nothing unless scripted otherwise.
    pub fn new() -> Self {
        Self { script: Script::new(MockStep::Return(String::new())), versions: Mutex::new(Vec::new()) }
    }

    pub async fn push(&self, step: MockStep<String>) {
        self.script.push(step).await;
    }

    pub async fn scanned_versions(&self) -> Vec<String> {
        self.versions.lock().await.clone()
    }
}

impl Default for MockStaticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StaticAnalyzer for MockStaticAnalyzer {
    fn name(&self) -> &'static str {
        "static analyzer"
    }

    async fn scan(&self, _workdir: &Path, _source: &str, version: &VersionTag) -> DomainResult<String> {
        self.versions.lock().await.push(version.to_string());
        self.script.next(self.name()).await
    }
}

pub struct MockFuzzExecutor {
    script: Script<FuzzReport>,
    calls: Mutex<Vec<u32>>,
}

impl MockFuzzExecutor {
    /// Fuzzer that passes with 500 runs unless scripted otherwise.
    pub fn new() -> Self {
        Self { script: Script::new(MockStep::Return(FuzzReport::passed(500))), calls: Mutex::new(Vec::new()) }
    }

    pub async fn push(&self, step: MockStep<FuzzReport>) {
        self.script.push(step).await;
    }

    pub async fn rounds(&self) -> Vec<u32> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockFuzzExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FuzzExecutor for MockFuzzExecutor {
    fn name(&self) -> &'static str {
        "fuzzer"
    }

    async fn run(&self, workdir: &Path, _source_path: &Path, round_index: u32) -> DomainResult<FuzzReport> {
        self.calls.lock().await.push(round_index);
        let mut report = self.script.next(self.name()).await?;

        // Materialise scripted evidence so the engine can read it back
        if let Some(evidence) = report.evidence_path.take() {
            let path: PathBuf = if evidence.is_absolute() { evidence } else { workdir.join(evidence) };
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, format!("// fuzz harness round {round_index}\n")).await?;
            }
            report.evidence_path = Some(path);
        }
        Ok(report)
    }
}

pub struct MockExploitGenerator {
    script: Script<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExploitGenerator {
    /// Generator that produces an exploit with no routines unless scripted
    /// otherwise.
    pub fn new() -> Self {
        Self {
            script: Script::new(MockStep::Return("// no exploit".to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, step: MockStep<String>) {
        self.script.push(step).await;
    }

    /// `(source, report)` pairs of every call.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockExploitGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExploitGenerator for MockExploitGenerator {
    fn name(&self) -> &'static str {
        "exploit generator"
    }

    async fn generate(&self, source: &str, report: &str) -> DomainResult<String> {
        self.calls.lock().await.push((source.to_string(), report.to_string()));
        self.script.next(self.name()).await
    }
}

/// A recorded patch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCall {
    pub source: String,
    pub report: String,
    pub failing_evidence: String,
}

pub struct MockPatchGenerator {
    script: Script<String>,
    calls: Mutex<Vec<PatchCall>>,
}

impl MockPatchGenerator {
    /// Generator that degrades unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            script: Script::new(MockStep::Degraded("no scripted patch".to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn push(&self, step: MockStep<String>) {
        self.script.push(step).await;
    }

    pub async fn calls(&self) -> Vec<PatchCall> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockPatchGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PatchGenerator for MockPatchGenerator {
    fn name(&self) -> &'static str {
        "patch generator"
    }

    async fn fix(&self, source: &str, report: &str, failing_evidence: &str) -> DomainResult<String> {
        self.calls.lock().await.push(PatchCall {
            source: source.to_string(),
            report: report.to_string(),
            failing_evidence: failing_evidence.to_string(),
        });
        self.script.next(self.name()).await
    }
}

pub struct MockRegressionRunner {
    script: Script<RegressionReport>,
    patterns: Mutex<Vec<String>>,
}

impl MockRegressionRunner {
    /// Runner that reports no routines unless scripted otherwise.
    pub fn new() -> Self {
        Self { script: Script::new(MockStep::Return(RegressionReport::new())), patterns: Mutex::new(Vec::new()) }
    }

    pub async fn push(&self, step: MockStep<RegressionReport>) {
        self.script.push(step).await;
    }

    pub async fn patterns(&self) -> Vec<String> {
        self.patterns.lock().await.clone()
    }
}

impl Default for MockRegressionRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegressionRunner for MockRegressionRunner {
    fn name(&self) -> &'static str {
        "regression runner"
    }

    async fn run(&self, _workdir: &Path, name_pattern: &str) -> DomainResult<RegressionReport> {
        self.patterns.lock().await.push(name_pattern.to_string());
        self.script.next(self.name()).await
    }
}
