//! Headerer
//!
//! Strips copier headers from ROM dumps and restores them from the header
//! store.

use anyhow::{bail, Context};
use cartridge_headers::{HeaderError, HeadererBuilder, HeadererConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "headerer")]
#[command(about = "Detect, strip and restore ROM copier headers")]
struct Args {
    /// Config file (TOML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Header store (SQLite file)
    #[arg(short = 's', long, global = true)]
    store: Option<PathBuf>,

    /// Extra rule documents (.toml or .json)
    #[arg(short = 'r', long = "rules", global = true)]
    rules: Vec<PathBuf>,

    /// Only try the detector with this name
    #[arg(short = 'd', long, global = true)]
    detector: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Strip the header from a dump and record it
    Extract {
        input: PathBuf,

        /// Output directory [default: next to the input]
        #[arg(short = 'o', long)]
        out_dir: Option<PathBuf>,

        /// Do not record the stripped header
        #[arg(long)]
        no_store: bool,
    },
    /// Rebuild every known original of a stripped dump
    Restore {
        input: PathBuf,

        /// Output directory [default: next to the input]
        #[arg(short = 'o', long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => HeadererConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => HeadererConfig::default(),
    };
    if let Some(store) = args.store {
        config.store_path = store;
    }
    if args.detector.is_some() {
        config.detector = args.detector;
    }
    config.rule_files.extend(args.rules);

    match args.command {
        Command::Extract {
            input,
            out_dir,
            no_store,
        } => {
            if out_dir.is_some() {
                config.output_dir = out_dir;
            }
            if no_store {
                config.persist_headers = false;
            }
            let headerer = HeadererBuilder::from_config(config).build()?;

            match headerer.extract(&input) {
                Ok(outcome) => {
                    info!(
                        "Stripped {} byte {} header: {:?}",
                        outcome.header.len(),
                        outcome.rule.source_id,
                        outcome.output
                    );
                    println!("{}", outcome.output.display());
                }
                Err(HeaderError::NoMatch(path)) => {
                    error!("No copier header detected in {:?}", path);
                    bail!("no header detected");
                }
                Err(e) => return Err(e).context(format!("Failed to extract {:?}", input)),
            }
        }
        Command::Restore { input, out_dir } => {
            if out_dir.is_some() {
                config.output_dir = out_dir;
            }
            let headerer = HeadererBuilder::from_config(config).build()?;

            let outputs = headerer
                .restore(&input)
                .with_context(|| format!("Failed to restore {:?}", input))?;
            for output in outputs {
                println!("{}", output.display());
            }
        }
    }

    Ok(())
}
