//! Slither static analyzer adapter.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use super::docker::DockerRunner;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ToolchainConfig, VersionTag};
use crate::domain::ports::StaticAnalyzer;

pub const DEFAULT_SOLC_VERSION: &str = "0.8.20";

const SCAN_FILE: &str = "Scan.sol";

static PRAGMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pragma\s+solidity\s+[^;]*?(\d+\.\d+\.\d+)").unwrap());

/// Compiler version named by the first `pragma solidity` line.
pub fn detect_solc_version(source: &str) -> String {
    PRAGMA_RE
        .captures(source)
        .and_then(|c| c.get(1))
        .map_or_else(|| DEFAULT_SOLC_VERSION.to_string(), |m| m.as_str().to_string())
}

#[derive(Debug, Deserialize)]
struct SlitherOutput {
    #[serde(default)]
    results: SlitherResults,
}

#[derive(Debug, Default, Deserialize)]
struct SlitherResults {
    #[serde(default)]
    detectors: Vec<Detector>,
}

#[derive(Debug, Deserialize)]
struct Detector {
    #[serde(default)]
    check: Option<String>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Render detector findings as markdown. No findings renders as an empty
/// report.
pub fn render_report(json: &str, version: &VersionTag) -> Result<String, serde_json::Error> {
    let output: SlitherOutput = serde_json::from_str(json)?;
    let detectors = output.results.detectors;
    if detectors.is_empty() {
        return Ok(String::new());
    }

    let mut report = format!("### Slither Report ({version})\n\n");
    for (idx, d) in detectors.iter().enumerate() {
        let _ = writeln!(
            report,
            "**{}. {}** [{}]\n- **Description**: {}\n",
            idx + 1,
            d.check.as_deref().unwrap_or("Unknown"),
            d.impact.as_deref().unwrap_or("Unknown"),
            d.description.as_deref().unwrap_or("No description").trim()
        );
    }
    Ok(report)
}

pub struct SlitherAnalyzer {
    docker: DockerRunner,
    image: String,
}

impl SlitherAnalyzer {
    pub fn new(docker: DockerRunner, toolchain: &ToolchainConfig) -> Self {
        Self { docker, image: toolchain.slither_image.clone() }
    }
}

#[async_trait]
impl StaticAnalyzer for SlitherAnalyzer {
    fn name(&self) -> &'static str {
        "static analyzer"
    }

    async fn scan(&self, workdir: &Path, source: &str, version: &VersionTag) -> DomainResult<String> {
        let artifacts = workdir.join("artifacts");
        tokio::fs::create_dir_all(&artifacts).await?;
        tokio::fs::write(artifacts.join(SCAN_FILE), source).await?;

        let solc = detect_solc_version(source);
        let report_file = format!("slither_report_{version}.json");
        let report_path = artifacts.join(&report_file);
        if tokio::fs::try_exists(&report_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&report_path).await?;
        }

        let command = format!(
            "solc-select install {solc} && solc-select use {solc} && \
             slither {SCAN_FILE} --exclude-informational --exclude-optimization --exclude-low --json {report_file}"
        );
        let output = self.docker.run(self.name(), &self.image, &artifacts, &command).await?;

        let json = tokio::fs::read_to_string(&report_path).await.map_err(|_| {
            DomainError::tool_fatal(
                self.name(),
                format!("no report generated ({version}): {}", output.combined().trim()),
            )
        })?;

        let report = render_report(&json, version)
            .map_err(|e| DomainError::tool_fatal(self.name(), format!("malformed report: {e}")))?;
        tracing::debug!(%version, solc = %solc, findings = !report.is_empty(), "Static scan finished");
        Ok(report)
    }
}
