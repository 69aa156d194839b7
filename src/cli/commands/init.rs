//! Implementation of the `redline init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::{initialize_database, PoolConfig};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::loader::CONFIG_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force reinitialization even if already initialized
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub initialized_path: PathBuf,
    pub directories_created: Vec<String>,
    pub database_initialized: bool,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.database_initialized {
            lines.push(format!("\nDatabase initialized at {CONFIG_DIR}/redline.db"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Project config written by `init`: defaults with file logging enabled.
fn initial_config() -> Config {
    let mut config = Config::default();
    config.logging.log_dir = Some(PathBuf::from(CONFIG_DIR).join("logs"));
    config
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir().context("Failed to get current directory")?.join(&args.path)
    };

    let redline_dir = target_path.join(CONFIG_DIR);

    if redline_dir.exists() && !args.force {
        let output_data = InitOutput {
            success: false,
            message: "Project already initialized. Use --force to reinitialize.".to_string(),
            initialized_path: target_path,
            directories_created: vec![],
            database_initialized: false,
        };
        output(&output_data, json_mode);
        return Ok(());
    }

    if args.force && redline_dir.exists() {
        fs::remove_dir_all(&redline_dir)
            .await
            .context("Failed to remove existing .redline directory")?;
    }

    let mut directories_created = vec![];
    let dirs = [redline_dir.clone(), redline_dir.join("storage"), redline_dir.join("logs")];
    for dir in &dirs {
        if !dir.exists() {
            fs::create_dir_all(dir).await.with_context(|| format!("Failed to create {}", dir.display()))?;
            let relative = dir.strip_prefix(&target_path).unwrap_or(dir).to_string_lossy().to_string();
            directories_created.push(relative);
        }
    }

    let config = initial_config();
    let yaml = serde_yaml::to_string(&config).context("Failed to render default configuration")?;
    fs::write(redline_dir.join("config.yaml"), yaml)
        .await
        .context("Failed to write config.yaml")?;

    let db_path = redline_dir.join("redline.db");
    let db_url = format!("sqlite:{}", db_path.display());
    initialize_database(&db_url, Some(PoolConfig::from(&config.database)))
        .await
        .context("Failed to initialize database")?;

    let output_data = InitOutput {
        success: true,
        message: if args.force {
            "Project reinitialized successfully.".to_string()
        } else {
            "Project initialized successfully.".to_string()
        },
        initialized_path: target_path,
        directories_created,
        database_initialized: true,
    };

    output(&output_data, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ConfigLoader;

    #[tokio::test]
    async fn test_init_creates_layout_and_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        execute(InitArgs { force: false, path: dir.path().to_path_buf() }, true)
            .await
            .unwrap();

        let redline_dir = dir.path().join(CONFIG_DIR);
        assert!(redline_dir.join("storage").is_dir());
        assert!(redline_dir.join("redline.db").exists());

        let config = ConfigLoader::load_from_file(redline_dir.join("config.yaml")).unwrap();
        assert_eq!(config.logging.log_dir, Some(PathBuf::from(".redline/logs")));
    }

    #[tokio::test]
    async fn test_init_without_force_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let redline_dir = dir.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&redline_dir).unwrap();
        std::fs::write(redline_dir.join("config.yaml"), "max_concurrent_tasks: 9\n").unwrap();

        execute(InitArgs { force: false, path: dir.path().to_path_buf() }, true)
            .await
            .unwrap();

        let kept = std::fs::read_to_string(redline_dir.join("config.yaml")).unwrap();
        assert_eq!(kept, "max_concurrent_tasks: 9\n");
    }
}
