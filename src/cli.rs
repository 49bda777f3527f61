//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChatRelay - streaming chat gateway
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "Streaming chat gateway and client orchestration core")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "chatrelay.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway server
    Serve {
        /// Override the bind address from the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Load and validate the configuration, then report what would run
    Check,
}
