//! Database operations for chat sessions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cartwise_core::{Country, SessionId, UserId};

use super::RepositoryError;
use crate::models::{DEFAULT_SESSION_TITLE, Session};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` session queries.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    country: String,
    created_at: DateTime<Utc>,
    is_disabled: bool,
}

impl TryFrom<SessionRow> for Session {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let country = Country::parse(&row.country)
            .map_err(|e| RepositoryError::DataCorruption(format!("session {}: {e}", row.id)))?;

        Ok(Self {
            id: SessionId::new(row.id),
            user_id: UserId::new(row.user_id),
            title: row.title,
            country,
            created_at: row.created_at,
            is_disabled: row.is_disabled,
        })
    }
}

const SESSION_COLUMNS: &str = "id, user_id, title, country, created_at, is_disabled";

// =============================================================================
// Repository
// =============================================================================

/// Repository for chat session database operations.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    /// Create a new session repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new session with the default title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        country: &Country,
    ) -> Result<Session, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r"
            INSERT INTO chat_session (id, user_id, title, country)
            VALUES ($1, $2, $3, $4)
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(SessionId::generate())
        .bind(user_id)
        .bind(DEFAULT_SESSION_TITLE)
        .bind(country)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Get a session by ID, including disabled ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_session WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List enabled sessions for a user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r"
            SELECT {SESSION_COLUMNS}
            FROM chat_session
            WHERE user_id = $1 AND NOT is_disabled
            ORDER BY created_at DESC
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Update a session's title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_title(&self, id: SessionId, title: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chat_session SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
