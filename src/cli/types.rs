//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::{init::InitArgs, task::TaskArgs};

#[derive(Parser, Debug)]
#[command(name = "redline")]
#[command(about = "Redline - adversarial smart-contract hardening", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Redline configuration and database
    Init(InitArgs),

    /// Hardening task commands
    Task(TaskArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::task::TaskCommands;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_multiple_ids() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let cli = Cli::try_parse_from(["redline", "--json", "task", "run", &format!("{a},{b}")]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Task(args) => match args.command {
                TaskCommands::Run { task_ids } => assert_eq!(task_ids, vec![a, b]),
                other => panic!("unexpected command: {other:?}"),
            },
            Commands::Init(_) => panic!("unexpected init"),
        }
    }
}
