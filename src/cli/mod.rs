//! CLI Module
//!
//! Command-line interface for the Moodshift effects processor.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Moodshift - apply effect chains to audio files
#[derive(Parser, Debug)]
#[command(name = "moodshift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON config file (defaults come from MOODSHIFT_* variables)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one audio file through an effect chain
    #[command(name = "process")]
    Process {
        /// Input audio file
        input: PathBuf,

        /// Output format: wav, mp3, m4a, ogg or flac
        #[arg(short, long, default_value = "wav")]
        format: String,

        /// Effect chain as JSON, or @path to a JSON file
        #[arg(long, default_value = "[]")]
        chain: String,

        /// Folder for the processed file
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },

    /// Delete stored files older than the retention age
    #[command(name = "sweep")]
    Sweep {
        /// Override the configured maximum age in days
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// List supported effects and their parameters
    #[command(name = "effects")]
    Effects,
}
