mod cli;
mod commands;
mod config;
mod manifest;
mod resource;
mod runner;
mod state;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

use crate::config::StewardConfig;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: StewardConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "steward", &mut io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => StewardConfig::load_from(path)?,
        None => StewardConfig::load()?,
    };

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Hostname(args) => commands::hostname::run(&ctx, args),
        Command::Report { json } => commands::report::run(&ctx, json),
        Command::Resources => commands::resources::run(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
