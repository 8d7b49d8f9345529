//! livefeed CLI
//!
//! Command-line tools for live activity feeds.
//!
//! # Commands
//!
//! - `tail` - Load the snapshot, then print new records as they arrive
//! - `snapshot` - Print the most recent records once
//! - `frames` - Dump raw stream frames for debugging

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::OutputFormat;
use livefeed_engine::{FeedConfig, DEFAULT_CAPACITY, DEFAULT_RESOURCE};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Live activity feed tools.
#[derive(Parser)]
#[command(name = "livefeed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(
        global = true,
        long,
        env = "LIVEFEED_BASE_URL",
        default_value = "http://127.0.0.1:8000"
    )]
    base_url: String,

    /// Bearer token
    #[arg(global = true, long, env = "LIVEFEED_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Feed resource path
    #[arg(global = true, long, default_value = DEFAULT_RESOURCE)]
    resource: String,

    /// Only show records from this board
    #[arg(global = true, long)]
    board_id: Option<Uuid>,

    /// Number of records kept and requested by the snapshot
    #[arg(global = true, long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the snapshot, then follow the live stream until Ctrl-C
    Tail,

    /// Print the most recent records once
    Snapshot,

    /// Dump decoded stream frames for debugging
    Frames {
        /// Catch-up cursor (RFC 3339, or ISO-8601 without offset for UTC)
        #[arg(short, long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Stop after this many frames
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    fn feed_config(&self) -> FeedConfig {
        let mut config = FeedConfig::new(self.base_url.clone())
            .with_resource(self.resource.clone())
            .with_capacity(self.capacity);
        if let Some(token) = &self.token {
            config = config.with_auth_token(token.clone());
        }
        if let Some(board_id) = self.board_id {
            config = config.with_board(board_id);
        }
        config
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    livefeed_protocol::parse_timestamp(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.feed_config();
    config.validate()?;

    match cli.command {
        Commands::Tail => commands::tail::run(config, cli.format).await?,
        Commands::Snapshot => commands::snapshot::run(&config, cli.format).await?,
        Commands::Frames { since, limit } => {
            commands::frames::run(&config, since, limit, cli.format).await?
        }
    }

    Ok(())
}
