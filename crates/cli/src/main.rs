//! Ensemble CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Run a pool definition on an input
//! - `memory`  — Store, search and manage long-term memory
//! - `config`  — Create or show the configuration file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ensemble",
    about = "Ensemble — pools of cooperating agents with long-term memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pool of agents on an input
    Run {
        /// Pool definition (TOML)
        #[arg(short, long)]
        pool: PathBuf,

        /// The run's initial input
        #[arg(short, long)]
        input: String,

        /// Override the iteration bound
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage long-term memory
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Store a fact
    Store {
        text: String,

        /// Metadata as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Find the facts most similar to a query
    Search {
        query: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Drop results scoring below this similarity
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Show one fact
    Get { id: String },

    /// Delete one fact
    Delete { id: String },

    /// Count stored facts
    Count,

    /// Delete every fact
    Clear {
        /// Required to actually clear
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            pool,
            input,
            max_iterations,
            json,
        } => commands::run::run(&pool, &input, max_iterations, json).await?,
        Commands::Memory { action } => match action {
            MemoryCommand::Store { text, meta } => commands::memory::store(&text, &meta).await?,
            MemoryCommand::Search {
                query,
                limit,
                min_score,
            } => commands::memory::search(&query, limit, min_score).await?,
            MemoryCommand::Get { id } => commands::memory::get(&id).await?,
            MemoryCommand::Delete { id } => commands::memory::delete(&id).await?,
            MemoryCommand::Count => commands::memory::count().await?,
            MemoryCommand::Clear { confirm } => commands::memory::clear(confirm).await?,
        },
        Commands::Config { action } => match action {
            ConfigCommand::Init { force } => commands::config_cmd::init(force)?,
            ConfigCommand::Show => commands::config_cmd::show()?,
        },
    }

    Ok(())
}
