//! Transcript replay command.
//!
//! Prints the messages the model would receive as history for the next turn
//! of a session.
//!
//! # Usage
//!
//! ```bash
//! cw-cli replay 0b9e7c55-8f0d-4c3e-b1a2-5d7f2e8c4a90 > transcript.json
//! ```

use std::io::Write;

use cartwise_assistant::db::{PgStore, SessionStore};
use cartwise_assistant::services::history;
use cartwise_core::SessionId;

use super::{CommandError, connect};

/// Print a session's replayed transcript as pretty JSON on stdout.
///
/// # Errors
///
/// Returns `CommandError` if the session doesn't exist or the log can't be read.
pub async fn run(session_id: &str) -> Result<(), CommandError> {
    let session_id: SessionId = session_id.parse().map_err(|_| {
        CommandError::InvalidArgument(format!("session id must be a UUID: {session_id}"))
    })?;

    let store = PgStore::new(connect().await?);
    if store.find_session(session_id).await?.is_none() {
        return Err(CommandError::NotFound(format!("session {session_id}")));
    }

    let messages = history::replay(&store, session_id).await?;
    tracing::info!("Replayed {} messages", messages.len());

    let json = serde_json::to_string_pretty(&messages)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}
