//! Cartwise CLI - Database migrations and session debugging tools.
//!
//! # Usage
//!
//! ```bash
//! # Run assistant database migrations
//! cw-cli migrate
//!
//! # Create a chat session for a user
//! cw-cli session create --user 6f1c0f7e-2d0b-4a57-9a43-1f6c1b0f9f11 --country ae
//!
//! # Print the model transcript replayed from a session's log
//! cw-cli replay 0b9e7c55-8f0d-4c3e-b1a2-5d7f2e8c4a90
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `session create` - Create a chat session
//! - `replay` - Print a session's replayed transcript as JSON

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cw-cli")]
#[command(author, version, about = "Cartwise CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage chat sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Print the replayed model transcript of a session
    Replay {
        /// Session ID (UUID)
        session_id: String,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a new chat session
    Create {
        /// Owning user ID (UUID)
        #[arg(short, long)]
        user: String,

        /// Marketplace country code
        #[arg(short, long, default_value = "ae")]
        country: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Session { action } => match action {
            SessionAction::Create { user, country } => {
                commands::session::create(&user, &country).await?;
            }
        },
        Commands::Replay { session_id } => commands::replay::run(&session_id).await?,
    }
    Ok(())
}
