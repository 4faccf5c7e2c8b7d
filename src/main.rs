//! stonetrack - stone material lifecycle and measurement tool
//!
//! Calculator commands for cutting/polishing figures, plus scenario replay
//! through the lifecycle engine and component wear accounting.

mod commands;
mod config;
mod journal;
mod scenario;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stonetrack")]
#[command(about = "Stone block and slab lifecycle, measurements and component wear")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "STONETRACK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Stage whose allowance rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Raw length/height plus allowance
    Cutting,
    /// (raw - polished) length/height plus allowance
    Polishing,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Face area in square feet from length and height in inches
    Sqft {
        #[arg(short, long)]
        length: Option<f64>,

        #[arg(short = 'H', long)]
        height: Option<f64>,
    },

    /// Volume in cubic inches and cubic centimetres
    Volume {
        #[arg(short, long)]
        length: Option<f64>,

        #[arg(short, long)]
        breadth: Option<f64>,

        #[arg(short = 'H', long)]
        height: Option<f64>,
    },

    /// Estimated block weight in tons
    Weight {
        #[arg(short, long)]
        length: f64,

        #[arg(short, long)]
        breadth: f64,

        #[arg(short = 'H', long)]
        height: f64,
    },

    /// Allowance-adjusted dimensions, with area and amount when a rate is given
    Allowance {
        #[arg(short, long)]
        length: f64,

        #[arg(short = 'H', long)]
        height: f64,

        /// Processing stage
        #[arg(short, long, value_enum, default_value = "cutting")]
        stage: Stage,

        /// Polished length (polishing stage)
        #[arg(long, required_if_eq("stage", "polishing"))]
        polished_length: Option<f64>,

        /// Polished height (polishing stage)
        #[arg(long, required_if_eq("stage", "polishing"))]
        polished_height: Option<f64>,

        /// Rate per square foot
        #[arg(short, long)]
        rate: Option<f64>,
    },

    /// Amount for an area at a rate per square foot
    Amount {
        #[arg(short, long)]
        sqft: f64,

        #[arg(short, long)]
        rate: f64,
    },

    /// Run a YAML scenario through the lifecycle engine
    Replay {
        /// Scenario file
        file: PathBuf,

        /// Append transition records to this journal (overrides config)
        #[arg(short, long)]
        journal: Option<PathBuf>,
    },

    /// Check every record in a transition journal
    VerifyJournal {
        /// Journal file
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return Err(e.into());
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &cli.config {
        tracing::debug!("Loaded config from {}", path.display());
    }

    match commands::execute(cli.command, &config) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
