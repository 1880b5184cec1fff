//! CLI command implementations.

pub mod migrate;
pub mod replay;
pub mod session;

use sqlx::PgPool;
use thiserror::Error;

use cartwise_assistant::db::RepositoryError;

/// Environment variable holding the assistant database URL.
const DATABASE_URL_VAR: &str = "ASSISTANT_DATABASE_URL";

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository operation failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Invalid command argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Output could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Output could not be written.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connect to the assistant database.
async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var(DATABASE_URL_VAR).map_err(|_| CommandError::MissingEnvVar(DATABASE_URL_VAR))?;

    tracing::info!("Connecting to assistant database...");
    let pool = cartwise_assistant::db::create_pool(&database_url.into()).await?;
    Ok(pool)
}
