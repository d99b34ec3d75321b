mod api;
mod cli;
mod commands;
mod errors;
mod file_processing;
mod models;
mod session;
mod utils;

use clap::Parser;
use cli::args::{Args, Commands};
use cli::display::CliDisplayManager;
use commands::RunOptions;
use errors::AppError;
use std::process::ExitCode;
use utils::config::{get_config_path, read_config};
use utils::logger;

/// The main entry point of the application
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut display_manager = CliDisplayManager::new();

    match run(args, &mut display_manager).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display_manager.stop_spinner();
            log::debug!("{:?}", e);
            display_manager.print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, display_manager: &mut CliDisplayManager) -> Result<(), AppError> {
    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let mut config = read_config(&config_path)?;

    // The config subcommand edits the file itself, so overrides stay out of it.
    if let Some(Commands::Config(config_args)) = args.command {
        commands::handle_config(&config_path, config, config_args)?;
        return Ok(());
    }

    args.overrides.apply_to(&mut config)?;
    logger::setup_logger(&config);
    log::debug!("Using config {}", config_path.display());

    match args.command {
        Some(Commands::Collect) => {
            commands::handle_collect(&config, display_manager).await?;
        }
        Some(Commands::Analyze) => {
            commands::handle_analyze(&config, display_manager).await?;
        }
        Some(Commands::Apply { dry_run }) => {
            commands::handle_apply(&config, dry_run, display_manager).await?;
        }
        Some(Commands::Parse { input, output }) => {
            commands::handle_parse(&config, &input, output, display_manager).await?;
        }
        Some(Commands::Rollback) => {
            commands::handle_rollback(&config, display_manager).await?;
        }
        Some(Commands::Config(_)) => {}
        None => {
            let options = RunOptions {
                collect: !args.no_collect,
                analyze: !args.no_analyze,
                apply: args.apply,
                dry_run: args.dry_run,
            };
            commands::handle_run(&config, options, display_manager).await?;
        }
    }

    Ok(())
}
