use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;

mod args;
mod commands;
mod config;
mod error;
mod manifest;

use config::Config;
use error::CliError;

#[derive(Parser, Debug)]
#[command(name = "bitey")]
#[command(version, about = "Inspect compiled modules and call their exports through generated bindings", long_about = None)]
struct Args {
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// Configuration file (defaults to ./bitey.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra directory to search for libraries; may be repeated
    #[arg(short = 'L', long = "search-path", global = true, value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List the symbols of an artifact with their types
    Inspect {
        /// Artifact manifest (JSON)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bind an exported function and call it once
    Call {
        /// Artifact manifest (JSON)
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
        /// Exported function to call
        #[arg(value_name = "SYMBOL")]
        symbol: String,
        /// Arguments, converted according to the parameter types
        #[arg(value_name = "ARGS", allow_negative_numbers = true)]
        args: Vec<String>,
    },
}

fn init_logging(args: &Args, config: &Config) -> Result<(), CliError> {
    // Explicit -v/-q flags win over the config file.
    let level = match config.log_level()? {
        Some(level) if !args.verbosity.is_present() => level,
        _ => args.verbosity.log_level_filter(),
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
    Ok(())
}

fn run(args: Args) -> Result<(), CliError> {
    let cwd = std::env::current_dir().map_err(|source| CliError::IoError {
        path: PathBuf::from("."),
        operation: "resolve current directory",
        source,
    })?;
    let config = Config::discover(args.config.as_deref(), &cwd)?;
    init_logging(&args, &config)?;

    let mut search_paths = args.search_paths.clone();
    search_paths.extend(config.loader.search_paths.iter().cloned());

    match &args.command {
        Command::Inspect { manifest, json } => commands::handle_inspect(manifest, &search_paths, *json),
        Command::Call { manifest, symbol, args } => commands::handle_call(manifest, &search_paths, symbol, args),
    }
}

fn main() -> miette::Result<()> {
    run(Args::parse())?;
    Ok(())
}
