//! Database operations for the interaction log.
//!
//! Structured turn data (tool calls, provider results, keywords, cart
//! additions) lives in JSONB columns and is decoded through `TryFrom` so a
//! malformed row surfaces as `DataCorruption` rather than a driver error.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use cartwise_core::{InteractionId, NextStep, SessionId};

use super::RepositoryError;
use crate::models::{Interaction, InteractionPatch, NewInteraction, TokenUsage};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` interaction queries.
#[derive(Debug, sqlx::FromRow)]
struct InteractionRow {
    id: Uuid,
    session_id: Uuid,
    seq: i64,
    created_at: DateTime<Utc>,
    prompt: String,
    response: Option<String>,
    tool_calls: serde_json::Value,
    provider_results: serde_json::Value,
    search_keywords: serde_json::Value,
    added_to_cart: serde_json::Value,
    next_step: String,
    model: Option<String>,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    is_deleted: bool,
}

fn decode_column<T: serde::de::DeserializeOwned>(
    id: Uuid,
    column: &str,
    value: serde_json::Value,
) -> Result<T, RepositoryError> {
    serde_json::from_value(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("interaction {id} {column}: {e}")))
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = RepositoryError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: InteractionId::new(row.id),
            session_id: SessionId::new(row.session_id),
            seq: row.seq,
            created_at: row.created_at,
            prompt: row.prompt,
            response: row.response,
            tool_calls: decode_column(row.id, "tool_calls", row.tool_calls)?,
            provider_results: decode_column(row.id, "provider_results", row.provider_results)?,
            search_keywords: decode_column(row.id, "search_keywords", row.search_keywords)?,
            added_to_cart: decode_column(row.id, "added_to_cart", row.added_to_cart)?,
            next: row.next_step,
            model: row.model,
            usage: TokenUsage {
                prompt_tokens: row.prompt_tokens,
                completion_tokens: row.completion_tokens,
                total_tokens: row.total_tokens,
            },
            is_deleted: row.is_deleted,
        })
    }
}

/// Internal row type for token usage sums.
#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

const INTERACTION_COLUMNS: &str = "id, session_id, seq, created_at, prompt, response, \
     tool_calls, provider_results, search_keywords, added_to_cart, next_step, model, \
     prompt_tokens, completion_tokens, total_tokens, is_deleted";

// =============================================================================
// Repository
// =============================================================================

/// Repository for interaction log operations.
pub struct InteractionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InteractionRepository<'a> {
    /// Create a new interaction repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert the first record of a turn.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(&self, new: NewInteraction) -> Result<Interaction, RepositoryError> {
        let row = sqlx::query_as::<_, InteractionRow>(&format!(
            r"
            INSERT INTO interaction (
                id, session_id, prompt, response, tool_calls, provider_results,
                search_keywords, added_to_cart, next_step, model,
                prompt_tokens, completion_tokens, total_tokens
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {INTERACTION_COLUMNS}
            "
        ))
        .bind(InteractionId::generate())
        .bind(new.session_id)
        .bind(&new.prompt)
        .bind(&new.response)
        .bind(Json(&new.tool_calls))
        .bind(Json(&new.provider_results))
        .bind(Json(&new.search_keywords))
        .bind(Json(&new.added_to_cart))
        .bind(new.next.as_str())
        .bind(&new.model)
        .bind(new.usage.prompt_tokens)
        .bind(new.usage.completion_tokens)
        .bind(new.usage.total_tokens)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Apply a partial update to an unfinished turn.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the interaction doesn't exist,
    /// `RepositoryError::Conflict` if it has already reached `complete`.
    pub async fn patch(
        &self,
        id: InteractionId,
        patch: InteractionPatch,
    ) -> Result<Interaction, RepositoryError> {
        let row = sqlx::query_as::<_, InteractionRow>(&format!(
            r"
            UPDATE interaction SET
                response = COALESCE($2, response),
                tool_calls = COALESCE($3, tool_calls),
                provider_results = COALESCE($4, provider_results),
                search_keywords = COALESCE($5, search_keywords),
                added_to_cart = COALESCE($6, added_to_cart),
                next_step = COALESCE($7, next_step),
                model = COALESCE($8, model),
                prompt_tokens = COALESCE($9, prompt_tokens),
                completion_tokens = COALESCE($10, completion_tokens),
                total_tokens = COALESCE($11, total_tokens)
            WHERE id = $1 AND next_step <> $12
            RETURNING {INTERACTION_COLUMNS}
            "
        ))
        .bind(id)
        .bind(patch.response)
        .bind(patch.tool_calls.map(Json))
        .bind(patch.provider_results.map(Json))
        .bind(patch.search_keywords.map(Json))
        .bind(patch.added_to_cart.map(Json))
        .bind(patch.next.map(|n| n.as_str()))
        .bind(patch.model)
        .bind(patch.usage.map(|u| u.prompt_tokens))
        .bind(patch.usage.map(|u| u.completion_tokens))
        .bind(patch.usage.map(|u| u.total_tokens))
        .bind(NextStep::Complete.as_str())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get(id).await? {
                Some(_) => Err(RepositoryError::Conflict(format!(
                    "interaction {id} is already complete"
                ))),
                None => Err(RepositoryError::NotFound),
            },
        }
    }

    /// Non-deleted interactions of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_ordered(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, InteractionRow>(&format!(
            r"
            SELECT {INTERACTION_COLUMNS}
            FROM interaction
            WHERE session_id = $1 AND NOT is_deleted
            ORDER BY created_at ASC, seq ASC
            "
        ))
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get an interaction by ID, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: InteractionId) -> Result<Option<Interaction>, RepositoryError> {
        let row = sqlx::query_as::<_, InteractionRow>(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interaction WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Soft-delete an interaction.
    ///
    /// # Returns
    ///
    /// Returns `true` if the interaction existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn soft_delete(&self, id: InteractionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE interaction SET is_deleted = TRUE WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sum token usage over a session's non-deleted interactions.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn token_usage(&self, session_id: SessionId) -> Result<TokenUsage, RepositoryError> {
        let row = sqlx::query_as::<_, UsageRow>(
            r"
            SELECT
                COALESCE(SUM(prompt_tokens), 0)::BIGINT AS prompt_tokens,
                COALESCE(SUM(completion_tokens), 0)::BIGINT AS completion_tokens,
                COALESCE(SUM(total_tokens), 0)::BIGINT AS total_tokens
            FROM interaction
            WHERE session_id = $1 AND NOT is_deleted
            ",
        )
        .bind(session_id)
        .fetch_one(self.pool)
        .await?;

        Ok(TokenUsage {
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
        })
    }
}
