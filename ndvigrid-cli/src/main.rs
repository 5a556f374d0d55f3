//! Command line entry point for ndvigrid

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod output;

use cli::Commands;
use ndvigrid::config::AppConfig;
use output::OutputWriter;

/// Vegetation grid and deforestation dashboards
#[derive(Parser)]
#[command(name = "ndvigrid")]
#[command(author, version)]
#[command(about = "Vegetation grid analysis and deforestation raster dashboards")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let out = OutputWriter::new(cli.quiet);

    let result = match cli.command {
        Commands::Deforestation {
            tif_url,
            code_muni,
            output,
        } => cli::cmd_deforestation(&config, tif_url, code_muni, output, &out),
        Commands::Analyze(args) => cli::cmd_analyze(&config, args, &out),
    };

    if let Err(err) = result {
        out.error(format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
