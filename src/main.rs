use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use cli::demos;
use taskpipe::SchedulerConfig;
use taskpipe::config::PROJECT_NAME;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_NAME)
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!("{}.log", PROJECT_NAME));

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &SchedulerConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Window { tasks } => demos::window(config, *tasks),
        Commands::Priority => demos::priority(config),
        Commands::Dedup { count } => demos::dedup(config, *count),
        Commands::Serial { count } => demos::serial(config, *count),
        Commands::Chain => demos::chain(config),
        Commands::Lifecycle { count } => demos::lifecycle(config, *count),
        Commands::Config => {
            let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
            print!("{}", yaml);
            Ok(())
        }
        Commands::Stats { json } => demos::stats(config, *json),
    }
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = SchedulerConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
