//! volview CLI - command-line harness for the volview library.
//!
//! Commands:
//! - `bench`: render frames over a synthetic dataset and report metrics
//! - `config`: show, initialise or locate the configuration file

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use volview::config::{config_file_path, ViewerConfig};
use volview::logging::init_logging;

use commands::bench::BenchArgs;
use commands::config::ConfigCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "volview")]
#[command(version = volview::VERSION)]
#[command(about = "Progressive multi-resolution volume viewer core", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.volview/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overrides the configured level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames over a synthetic dataset and report cache and render metrics
    Bench(BenchArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Config { command } => commands::config::run(command, &config_path),
        Commands::Bench(args) => {
            let mut config = ViewerConfig::load_from(&config_path)?;
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            let _logging =
                init_logging(&config.logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;
            commands::bench::run(args, config)
        }
    }
}
