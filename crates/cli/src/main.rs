//! Colloquy CLI entry point.
//!
//! Commands:
//! - `chat`:    interactive chat or single-message mode
//! - `serve`:   start the HTTP gateway
//! - `tools`:   list registered tools
//! - `migrate`: create the database schema
//! - `ingest`:  embed a document into the knowledge base

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "colloquy",
    about = "Colloquy conversational agent runtime",
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
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Memory session to continue (needs a configured database)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List registered tools
    Tools,

    /// Create or update the database schema
    Migrate,

    /// Embed a document and store its chunks for retrieval
    Ingest {
        /// Path to a UTF-8 text file
        file: std::path::PathBuf,

        /// Source label stored with every chunk (defaults to the file name)
        #[arg(short, long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message, session } => commands::chat::run(message, session).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Ingest { file, source } => commands::ingest::run(&file, source).await?,
    }

    Ok(())
}
