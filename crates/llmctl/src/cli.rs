//! CLI - Command-line argument parsing

use clap::{Parser, Subcommand};
use llm_common::DEFAULT_API_URL;

/// Control client for llmd
#[derive(Parser, Debug)]
#[command(name = "llmctl")]
#[command(about = "Start, stop and inspect the local LLM services", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Base URL of the llmd API
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    pub url: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Show live status of one or all services
    Status {
        /// Service name (nllb, ollama)
        name: Option<String>,
    },

    /// Show daemon health and cached service state
    Health,

    /// Start a service
    Start { name: String },

    /// Stop a service
    Stop { name: String },

    /// Stop then start a service
    Restart { name: String },
}
