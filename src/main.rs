//! Redline CLI entry point.

use clap::Parser;

use redline::cli::{Cli, Commands};
use redline::infrastructure::config::ConfigLoader;
use redline::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => redline::cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => redline::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => redline::cli::commands::init::execute(args, cli.json).await,
        Commands::Task(args) => redline::cli::commands::task::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        redline::cli::handle_error(err, cli.json);
    }
}
