//! Command line front end.
//!
//! ```bash
//! # Import statements and print the activities as JSON
//! activity-import import statement.pdf export.csv --pretty
//!
//! # List the supported institutions
//! activity-import brokers
//! ```

use activity_import::{import_files, supported_brokers, ImportConfig, SystemClock};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "activity-import", version, about = "Extract activities from broker statements")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import one or more PDF or CSV documents
    Import {
        /// Files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reference time zone, overrides config and environment
        #[arg(long)]
        time_zone: Option<String>,
    },
    /// List the supported institutions
    Brokers,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG wins over -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Import {
            files,
            config,
            time_zone,
        } => {
            let mut import_config = ImportConfig::load(config.as_deref()).with_context(|| match &config {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;
            if let Some(zone) = time_zone {
                import_config = import_config.with_time_zone(&zone)?;
            }

            let results = import_files(&files, &import_config, &SystemClock);
            let failed = results.iter().filter(|result| !result.successful).count();
            print_json(&results, cli.pretty)?;

            if failed > 0 {
                log::warn!("{} of {} file(s) not imported", failed, results.len());
            }
        }
        Command::Brokers => print_json(&supported_brokers(), cli.pretty)?,
    }

    Ok(())
}
