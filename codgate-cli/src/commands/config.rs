//! Configuration inspection CLI commands.
//!
//! Provides `config path`, `config show` and `config init`. None of them
//! validate the configuration, so they work on a half-written file too.

use clap::Subcommand;
use codgate::config::{config_file_path, ConfigFile};
use codgate::GatewayConfig;

use crate::error::CliError;
use crate::runner::GlobalOptions;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration (defaults, file, environment) as INI
    Show,

    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(options: &GlobalOptions, command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(options),
        ConfigCommands::Show => run_show(options),
        ConfigCommands::Init { force } => run_init(options, force),
    }
}

fn target_path(options: &GlobalOptions) -> Result<std::path::PathBuf, CliError> {
    options
        .config
        .clone()
        .or_else(config_file_path)
        .ok_or_else(|| CliError::Config("no configuration directory on this platform".to_string()))
}

fn run_path(options: &GlobalOptions) -> Result<(), CliError> {
    let path = target_path(options)?;
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist, defaults and environment apply)");
    }
    Ok(())
}

fn run_show(options: &GlobalOptions) -> Result<(), CliError> {
    let config = GatewayConfig::load_layers(options.config.as_deref())?;
    print!("{}", ConfigFile::render(&config));
    if let Err(e) = config.validate() {
        eprintln!();
        eprintln!("Warning: {}", e);
    }
    Ok(())
}

fn run_init(options: &GlobalOptions, force: bool) -> Result<(), CliError> {
    let path = target_path(options)?;
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    // An explicit --config may name the file being created
    let source = options.config.as_deref().filter(|p| p.exists());
    let config = GatewayConfig::load_layers(source)?;
    ConfigFile::save(&config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
