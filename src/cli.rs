use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hdsflow")]
#[command(author, version, about = "HTTP Dynamic Streaming client")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the configured stream and write it as FLV
    Fetch {
        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Decode a bootstrap file and display its tables
    Inspect {
        /// Binary bootstrap (abst) file
        #[arg(required = true)]
        file: PathBuf,

        /// Quality modifier selecting sub-tables
        #[arg(short, long)]
        quality: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the fragments a bootstrap schedules
    Schedule {
        /// Binary bootstrap (abst) file
        #[arg(required = true)]
        file: PathBuf,

        /// Number of fragments to list
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Presentation length in seconds; omit for live
        #[arg(short, long)]
        duration: Option<u64>,

        /// Quality modifier selecting sub-tables
        #[arg(short, long)]
        quality: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
