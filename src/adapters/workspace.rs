//! Per-task working directories.
//!
//! Every task gets `<root>/tasks/<task_id>/`, laid out as a Foundry project
//! so the tool adapters can mount it directly:
//!
//! ```text
//! <task_id>/
//!   foundry.toml
//!   <ContractName>.sol        primary contract, replaced by each fix
//!   Backup_v{N}.sol           snapshot of each patch
//!   Red_Exploit_v{N}_<hex>.t.sol
//!   src/Target.sol            source under test
//!   test/Red_Exploit_v{N}.t.sol   candidate being pre-validated
//!   test/Matrix_{NN}.t.sol        staged regression corpus
//!   artifacts/                tool reports and fuzz harnesses
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExploitCase, VersionTag};

pub const TARGET_PATH: &str = "src/Target.sol";
pub const MATRIX_PATTERN: &str = "test/*.t.sol";

const MATRIX_PREFIX: &str = "Matrix_";
const FOUNDRY_TOML: &str = r#"[profile.default]
src = "src"
test = "test"
out = "out"
libs = ["lib"]
"#;

/// Root under which task directories are created.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn for_task(&self, task_id: Uuid) -> TaskWorkspace {
        TaskWorkspace { dir: self.root.join("tasks").join(task_id.to_string()) }
    }
}

/// Filesystem view of one task's working directory.
#[derive(Debug, Clone)]
pub struct TaskWorkspace {
    dir: PathBuf,
}

impl TaskWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    pub fn target_path(&self) -> PathBuf {
        self.dir.join(TARGET_PATH)
    }

    /// Create the directory skeleton and project file. Idempotent.
    pub async fn prepare(&self) -> DomainResult<()> {
        for sub in ["src", "test", "artifacts"] {
            fs::create_dir_all(self.dir.join(sub))
                .await
                .map_err(|e| workspace_err(&self.dir.join(sub), &e))?;
        }
        let toml = self.dir.join("foundry.toml");
        if !fs::try_exists(&toml).await.unwrap_or(false) {
            write(&toml, FOUNDRY_TOML).await?;
        }
        Ok(())
    }

    /// Write the primary contract file under its uploaded name.
    pub async fn write_primary(&self, contract_name: &str, source: &str) -> DomainResult<PathBuf> {
        let file_name = Path::new(contract_name)
            .file_name()
            .ok_or_else(|| DomainError::ValidationFailed(format!("invalid contract name: {contract_name}")))?;
        let path = self.dir.join(file_name);
        write(&path, source).await?;
        Ok(path)
    }

    pub async fn write_target(&self, source: &str) -> DomainResult<PathBuf> {
        let path = self.target_path();
        write(&path, source).await?;
        Ok(path)
    }

    /// Write a generated exploit as the pre-validation candidate.
    ///
    /// Returns the path relative to the workspace, for use as a runner pattern.
    pub async fn write_candidate(&self, version: &VersionTag, code: &str) -> DomainResult<String> {
        let relative = format!("test/Red_Exploit_{version}.t.sol");
        write(&self.dir.join(&relative), code).await?;
        Ok(relative)
    }

    pub async fn remove(&self, relative: &str) -> DomainResult<()> {
        let path = self.dir.join(relative);
        fs::remove_file(&path).await.map_err(|e| workspace_err(&path, &e))
    }

    /// Keep a confirmed exploit under a unique name.
    pub async fn save_exploit(&self, version: &VersionTag, code: &str) -> DomainResult<PathBuf> {
        let suffix = Uuid::new_v4().simple().to_string();
        let path = self.dir.join(format!("Red_Exploit_{version}_{}.t.sol", &suffix[..6]));
        write(&path, code).await?;
        Ok(path)
    }

    pub async fn save_backup(&self, version: &VersionTag, source: &str) -> DomainResult<PathBuf> {
        let path = self.dir.join(format!("Backup_{version}.sol"));
        write(&path, source).await?;
        Ok(path)
    }

    /// Stage the evidence of every case as a test file.
    ///
    /// Cases sharing one evidence snapshot (all routines of one generated
    /// exploit) are written once. Returns the number of files staged.
    pub async fn stage_matrix(&self, cases: &[ExploitCase]) -> DomainResult<usize> {
        let test_dir = self.dir.join("test");
        fs::create_dir_all(&test_dir).await.map_err(|e| workspace_err(&test_dir, &e))?;

        let mut entries = fs::read_dir(&test_dir).await.map_err(|e| workspace_err(&test_dir, &e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| workspace_err(&test_dir, &e))? {
            if entry.file_name().to_string_lossy().starts_with(MATRIX_PREFIX) {
                fs::remove_file(entry.path()).await.map_err(|e| workspace_err(&entry.path(), &e))?;
            }
        }

        let mut seen = HashSet::new();
        let mut staged = 0usize;
        for case in cases {
            if !seen.insert(case.code.as_str()) {
                continue;
            }
            staged += 1;
            let path = test_dir.join(format!("{MATRIX_PREFIX}{staged:02}.t.sol"));
            write(&path, &case.code).await?;
        }
        Ok(staged)
    }

    pub async fn read(&self, path: &Path) -> DomainResult<String> {
        let path = if path.is_absolute() { path.to_path_buf() } else { self.dir.join(path) };
        fs::read_to_string(&path).await.map_err(|e| workspace_err(&path, &e))
    }
}

async fn write(path: &Path, contents: &str) -> DomainResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| workspace_err(parent, &e))?;
    }
    fs::write(path, contents).await.map_err(|e| workspace_err(path, &e))
}

fn workspace_err(path: &Path, err: &std::io::Error) -> DomainError {
    DomainError::WorkspaceError(format!("{}: {err}", path.display()))
}
