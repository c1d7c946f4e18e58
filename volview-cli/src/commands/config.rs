//! Configuration management CLI commands.
//!
//! Provides `config show`, `config init` and `config path`.

use std::path::Path;

use clap::Subcommand;
use volview::config::ViewerConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Init { force } => run_init(path, force),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ViewerConfig::load_from(path)?;
    if !path.exists() {
        println!("; {} does not exist, showing defaults", path.display());
        println!();
    }
    print!("{}", config.to_ini_string());

    if let Err(e) = config.validate() {
        eprintln!();
        eprintln!("Warning: {}", e);
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    ViewerConfig::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        run_init(&path, false).unwrap();
        assert!(path.exists());
        assert!(matches!(run_init(&path, false), Err(CliError::Config(_))));
        run_init(&path, true).unwrap();
    }

    #[test]
    fn test_show_missing_file_uses_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        run_show(&temp_dir.path().join("missing.ini")).unwrap();
    }
}
