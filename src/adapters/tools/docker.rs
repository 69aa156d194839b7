//! Container execution shared by the toolchain adapters.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::errors::{DomainError, DomainResult};

/// Captured output of one container run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ProcessOutput {
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Runs shell commands inside a throwaway container with a directory
/// mounted at `/app`.
#[derive(Debug, Clone)]
pub struct DockerRunner {
    binary: String,
    timeout: Duration,
}

impl DockerRunner {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self { binary: binary.into(), timeout }
    }

    fn build_command(&self, image: &str, workdir: &Path, command: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/app", workdir.display()))
            .arg("-w")
            .arg("/app")
            .arg("--entrypoint")
            .arg("/bin/sh")
            .arg(image)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run `command` in `image`. A non-zero exit status is not an error;
    /// callers interpret the output.
    pub async fn run(
        &self,
        tool: &'static str,
        image: &str,
        workdir: &Path,
        command: &str,
    ) -> DomainResult<ProcessOutput> {
        let workdir = tokio::fs::canonicalize(workdir)
            .await
            .map_err(|e| DomainError::WorkspaceError(format!("{}: {e}", workdir.display())))?;

        tracing::debug!(tool, image, workdir = %workdir.display(), command, "Running container");

        let child = self
            .build_command(image, &workdir, command)
            .spawn()
            .map_err(|e| DomainError::tool_fatal(tool, format!("failed to spawn {}: {e}", self.binary)))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(DomainError::tool_fatal(tool, format!("container wait failed: {e}"))),
            Err(_) => {
                return Err(DomainError::ToolTimeout { tool, secs: self.timeout.as_secs() });
            }
        };

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        };
        tracing::debug!(tool, exit = ?output.status.code(), stdout_len = result.stdout.len(), "Container finished");
        Ok(result)
    }
}
