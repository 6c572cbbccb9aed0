use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;

mod builder;
mod cli;
mod commands;
mod config;
mod error;
mod event;
mod message;
mod probe;
mod report;
mod sender;
mod template;
mod transport;
mod vent;

use cli::{Cli, Commands};
use config::{Config, LogLevel};

fn setup_logging(log_level: LogLevel, config: &Config) -> Result<()> {
    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        // Let env_logger parse RUST_LOG
        builder.parse_default_env();
    } else {
        builder.filter_level(log_level.level_filter());
    }

    if let Some(ref path) = config.log_file {
        let path = Config::expand_path(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    } else {
        // stdout may carry vented records, keep logs off it
        builder.target(env_logger::Target::Stderr);
    }

    builder.init();

    info!(
        "Log level: {} (from {})",
        log_level.as_filter(),
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Send => commands::send::run(&config),
        Commands::Config { action } => commands::config::run(action, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let log_level = if cli.verbose { LogLevel::Debug } else { config.log_level };
    setup_logging(log_level, &config).context("Failed to setup logging")?;

    info!("Starting eventsender with config from: {:?}", cli.config);

    run(cli, config).context("Command failed")?;

    Ok(())
}
