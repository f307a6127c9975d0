//! Command-line interface definition for Travai
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for streaming chat and thread management.

use clap::{Parser, Subcommand};

/// Travai - Thailand travel guide chat client
///
/// Chat with the guide agent and manage saved conversation threads.
#[derive(Parser, Debug, Clone)]
#[command(name = "travai")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the guide server URL from config
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Travai
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive streaming chat
    Chat {
        /// Resume an existing thread instead of starting a new one
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// List saved threads
    Threads,

    /// Print the messages of a thread
    History {
        /// Thread id
        id: String,
    },

    /// Rename a thread
    Rename {
        /// Thread id
        id: String,
        /// New title
        title: String,
    },

    /// Delete a thread and its history
    Delete {
        /// Thread id
        id: String,
    },

    /// Store the API key in the system keyring
    Auth {
        /// API key; prompted for when omitted
        #[arg(short, long)]
        key: Option<String>,

        /// Remove the stored key instead
        #[arg(long, conflicts_with = "key")]
        clear: bool,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            base_url: None,
            command: Commands::Threads,
        }
    }
}
