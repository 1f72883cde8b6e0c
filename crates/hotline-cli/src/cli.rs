//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hotline - rebuild and hot reload a shared library while it runs
#[derive(Parser)]
#[command(name = "hotline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "HOTLINE_CONFIG",
        default_value = "hotline.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Watch sources, rebuild on change and report every reload
    Watch {
        /// Symbols that must resolve in each new build
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Load the library and call an exported `extern "C" fn(u64)` once per frame
    Run {
        /// Exported function called with the frame number
        #[arg(short, long, default_value = "update")]
        entry: String,

        /// Frames per second
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Load and validate the configuration, then print it
    Check,
}
