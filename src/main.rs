//! # Exam Relay CLI (`exr`)
//!
//! The `exr` binary runs the streaming answer relay and the tooling around
//! it.
//!
//! ## Usage
//!
//! ```bash
//! exr --config ./config/relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `exr init` | Create the SQLite database and run schema migrations |
//! | `exr serve` | Start the relay HTTP server |
//! | `exr ask "<question>"` | Ask a question through a running relay |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! exr init --config ./config/relay.toml
//!
//! # Start the relay (requires OPENROUTER_API_KEY in the environment)
//! exr serve --config ./config/relay.toml
//!
//! # Ask a question, attributing uploads to a user
//! exr ask "What is likely on the calculus final?" --user u-42
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exam Relay — a streaming AI answer relay for exam-prep study tools.
#[derive(Parser)]
#[command(
    name = "exr",
    about = "Exam Relay — a streaming AI answer relay for exam-prep study tools",
    version,
    long_about = "Exam Relay forwards study questions to a chat-completion provider with \
    streaming enabled, relays the event stream back to the caller, and extracts predicted \
    exam topics and summaries from finished answers."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/relay.toml`. Database, server, and upstream
    /// settings are read from this file; the upstream API credential comes
    /// from the environment.
    #[arg(long, global = true, default_value = "./config/relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (syllabi,
    /// past_papers, ai_answers, predicted_topics). Idempotent.
    Init,

    /// Start the relay HTTP server.
    ///
    /// Serves `POST /ask-ai` and `GET /health` on `[server].bind` until the
    /// process is terminated.
    Serve,

    /// Ask a question through a running relay and stream the answer.
    Ask {
        /// The question to ask.
        question: String,

        /// User identifier whose uploaded materials provide context.
        #[arg(long = "user")]
        user_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("exam_relay=info,exr=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = exam_relay::config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            exam_relay::migrate::run_migrations(&config).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Serve => {
            exam_relay::server::run_server(&config).await?;
        }
        Commands::Ask { question, user_id } => {
            exam_relay::ask::run_ask(&config, &question, user_id).await?;
        }
    }

    Ok(())
}
