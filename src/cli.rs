//! Command-line interface for checkers_arena.

use clap::{Parser, Subcommand};

use crate::games::checkers::Difficulty;

/// Checkers Arena - ranked checkers server with a search AI
#[derive(Parser, Debug)]
#[command(name = "checkers_arena")]
#[command(about = "Checkers game server with persistent Elo ratings", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP game server
    Serve {
        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "checkers_arena.db")]
        db_path: String,

        /// Move clock in milliseconds
        #[arg(long, default_value = "30000")]
        move_timeout_ms: u64,

        /// Warning threshold in milliseconds
        #[arg(long, default_value = "10000")]
        warning_threshold_ms: u64,
    },

    /// Play an AI-vs-AI demonstration game in the terminal
    Demo {
        /// Red's playing strength
        #[arg(long, default_value = "hard")]
        red: Difficulty,

        /// Blue's playing strength
        #[arg(long, default_value = "medium")]
        blue: Difficulty,
    },
}
