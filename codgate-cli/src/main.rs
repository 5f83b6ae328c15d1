//! codgate CLI - serve and warm the feature gateway
//!
//! ```text
//! codgate serve [--bind ADDR]
//! codgate resolve <LEVEL> <ISO3> <ADMIN> [-f FORMAT] [--simplify T] [--lco K=V]...
//! codgate prewarm --level N --region ISO3 [--region ...] [--admin 0..=4] [--formats ...]
//! codgate config path | show
//! ```

mod commands;
mod error;
mod runner;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;
use runner::GlobalOptions;

#[derive(Debug, Parser)]
#[command(name = "codgate", version, about = "Administrative-boundary features in any vector format")]
struct Cli {
    /// Configuration file (default: ~/.config/codgate/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging for codgate modules
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP gateway until Ctrl+C
    Serve {
        /// Listen address, overrides [server] bind
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Resolve one dataset and format, converting if needed, and print the URL
    Resolve {
        /// Processing level
        level: u32,
        /// Region code (ISO3)
        iso3: String,
        /// Administrative level
        admin: u32,
        /// Output format token
        #[arg(short, long, default_value = codgate::format::DEFAULT_FORMAT)]
        format: String,
        /// Simplification tolerance passed to the engine
        #[arg(long)]
        simplify: Option<String>,
        /// Extra layer creation option (KEY=VALUE), repeatable
        #[arg(long = "lco")]
        layer_creation_options: Vec<String>,
        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert every listed dataset into every listed format ahead of demand
    Prewarm {
        /// Processing level
        #[arg(long)]
        level: u32,
        /// Region code (ISO3), repeatable
        #[arg(long = "region", required = true)]
        regions: Vec<String>,
        /// Administrative levels, a single value or an inclusive range like 0..=4
        #[arg(long, default_value = "0")]
        admin: String,
        /// Formats to build (default: csv gdb geojson gpkg kml shp xlsx)
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        formats: Vec<String>,
        /// Concurrent resolutions, overrides [prewarm] concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        verbose: cli.verbose,
        log_dir: cli.log_dir,
    };

    match run(cli.command, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, options: &GlobalOptions) -> Result<(), CliError> {
    match command {
        Commands::Serve { bind } => commands::serve::run(options, bind),
        Commands::Resolve {
            level,
            iso3,
            admin,
            format,
            simplify,
            layer_creation_options,
            json,
        } => commands::resolve::run(
            options,
            commands::resolve::ResolveArgs {
                level,
                iso3,
                admin,
                format,
                simplify,
                layer_creation_options,
                json,
            },
        ),
        Commands::Prewarm {
            level,
            regions,
            admin,
            formats,
            concurrency,
        } => commands::prewarm::run(
            options,
            commands::prewarm::PrewarmArgs {
                level,
                regions,
                admin,
                formats,
                concurrency,
            },
        ),
        Commands::Config { command } => commands::config::run(options, command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve_with_options() {
        let cli = Cli::try_parse_from([
            "codgate", "resolve", "1", "abc", "2", "-f", "shp", "--lco", "ENCODING=UTF-8",
            "--lco", "SPATIAL_INDEX=NO",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                format,
                layer_creation_options,
                ..
            } => {
                assert_eq!(format, "shp");
                assert_eq!(layer_creation_options.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_prewarm_formats_list() {
        let cli = Cli::try_parse_from([
            "codgate", "prewarm", "--level", "1", "--region", "abc", "--region", "xyz",
            "--admin", "0..=2", "--formats", "kml,gpkg",
        ])
        .unwrap();
        match cli.command {
            Commands::Prewarm {
                regions, formats, ..
            } => {
                assert_eq!(regions, vec!["abc", "xyz"]);
                assert_eq!(formats, vec!["kml", "gpkg"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
