//! CLI for the sokrat-server binary
//!
//! Uses clap for argument parsing and owo-colors for colored terminal output.
//! Running without a subcommand starts the HTTP server.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sokrat - multi-model research server
#[derive(Parser, Debug)]
#[command(
    name = "sokrat-server",
    version,
    about = "Sokrat - multi-model research server",
    long_about = "Web retrieval with parallel multi-model analysis, and iterative research\n\
                  sessions critiqued by code, prompt and analytics experts.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  sokrat-server                                # Start the server\n    \
                  sokrat-server analyze \"КПД волновых станций\"  # One-shot analysis\n    \
                  sokrat-server research \"quicksort\" -r 2       # Research session\n    \
                  sokrat-server sessions list                  # Recorded sessions\n    \
                  sokrat-server config --validate              # Check sokrat.toml"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sokrat.toml", global = true)]
    pub config: PathBuf,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the one-shot query pipeline and print the analyses
    Analyze {
        /// Question to research
        query: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Run an iterative research session
    Research {
        /// Task to work on
        task: String,

        /// Round limit (defaults to research.max_rounds)
        #[arg(short = 'r', long)]
        max_rounds: Option<u32>,

        /// Extra context appended to the prompt
        #[arg(long)]
        context: Option<String>,

        /// What the answer must avoid
        #[arg(long)]
        avoid: Option<String>,

        /// Print the final session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect recorded research sessions
    #[command(subcommand)]
    Sessions(SessionCommands),

    /// Show configuration information
    Config {
        /// Validate the configuration file and exit
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Recorded sessions, newest first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Checkpoint history of one session
    Show { id: String },

    /// Delete a session and everything recorded for it
    Delete { id: String },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
