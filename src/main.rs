//! Taskforce CLI entry point.

use clap::Parser;

use taskforce::cli::commands;
use taskforce::cli::{handle_error, Cli, Commands};
use taskforce::infrastructure::logging::{LogConfig, LoggerImpl};
use taskforce::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config, cli.json).await,
        Commands::Serve(args) => commands::serve::execute(args, &config, cli.json).await,
        Commands::Sweep => commands::sweep::execute(&config, cli.json).await,
        Commands::Reconcile(args) => commands::reconcile::execute(args, &config, cli.json).await,
        Commands::Task(args) => commands::task::execute(args, &config, cli.json).await,
        Commands::Agent(args) => commands::agent::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
