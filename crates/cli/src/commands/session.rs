//! Chat session management commands.
//!
//! # Usage
//!
//! ```bash
//! cw-cli session create -u 6f1c0f7e-2d0b-4a57-9a43-1f6c1b0f9f11 -c eg
//! ```

use cartwise_assistant::db::{PgStore, SessionStore};
use cartwise_core::{Country, SessionId, UserId};

use super::{CommandError, connect};

/// Create a new chat session.
///
/// # Arguments
///
/// * `user` - Owning user ID
/// * `country` - Marketplace country code
///
/// # Returns
///
/// The ID of the created session.
///
/// # Errors
///
/// Returns `CommandError` if an argument is invalid or the insert fails.
pub async fn create(user: &str, country: &str) -> Result<SessionId, CommandError> {
    let user_id: UserId = user
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("user must be a UUID: {user}")))?;
    let country =
        Country::parse(country).map_err(|e| CommandError::InvalidArgument(e.to_string()))?;

    let store = PgStore::new(connect().await?);
    let session = store.create_session(user_id, &country).await?;

    tracing::info!(
        "Session created! ID: {}, User: {}, Country: {}",
        session.id,
        session.user_id,
        session.country
    );
    Ok(session.id)
}
