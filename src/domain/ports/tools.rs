//! Tool adapter ports.
//!
//! Each port is one call-to-completion against an external tool. Adapters
//! own any scraping of console or JSON output and hand the engine typed
//! results, so the engine never depends on a tool's text format.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FuzzReport, RegressionReport, VersionTag};

/// Static analyzer over a contract source.
#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Scan the source. An empty report means no actionable finding.
    async fn scan(&self, workdir: &Path, source: &str, version: &VersionTag) -> DomainResult<String>;
}

/// Property/fuzz executor.
#[async_trait]
pub trait FuzzExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, workdir: &Path, source_path: &Path, round_index: u32) -> DomainResult<FuzzReport>;
}

/// LLM-backed exploit generator.
#[async_trait]
pub trait ExploitGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce test source containing zero or more independently named
    /// attack routines (`testExploit_<Kind>_<NN>`).
    async fn generate(&self, source: &str, report: &str) -> DomainResult<String>;
}

/// LLM-backed patch generator.
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the full patched source.
    async fn fix(&self, source: &str, report: &str, failing_evidence: &str) -> DomainResult<String>;
}

/// Sandboxed test runner.
#[async_trait]
pub trait RegressionRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run every test file matching `name_pattern` (relative to `workdir`).
    ///
    /// Returns `ToolFatal` when the sources do not compile or the runner
    /// cannot execute.
    async fn run(&self, workdir: &Path, name_pattern: &str) -> DomainResult<RegressionReport>;
}
