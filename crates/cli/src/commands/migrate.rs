//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! cw-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `ASSISTANT_DATABASE_URL` - `PostgreSQL` connection string for the assistant
//!
//! # Migration Files
//!
//! Assistant migrations: `crates/assistant/migrations/`

use super::{CommandError, connect};

/// Run assistant database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running assistant migrations...");
    sqlx::migrate!("../assistant/migrations").run(&pool).await?;

    tracing::info!("Assistant migrations complete!");
    Ok(())
}
