//! Conversation history: model transcripts and app-facing turns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use cartwise_core::{InteractionId, ProductKey, SessionId};

use crate::db::{InteractionLog, RepositoryError};
use crate::llm::{ChatMessage, ToolCall};
use crate::models::{Interaction, ProviderResults, ToolCallRecord};

/// Rebuild the model transcript of a session from its interaction log.
///
/// # Errors
///
/// Returns `RepositoryError` if the log cannot be read.
#[instrument(skip(log), fields(session_id = %session_id))]
pub async fn replay<L: InteractionLog + ?Sized>(
    log: &L,
    session_id: SessionId,
) -> Result<Vec<ChatMessage>, RepositoryError> {
    let interactions = log.find_ordered(session_id).await?;
    Ok(transcript(&interactions))
}

/// Transcript of already-loaded interactions, in the given order.
///
/// Each interaction yields its prompt, one assistant/tool message pair per
/// recorded tool call, then the assistant reply when there is one.
#[must_use]
pub fn transcript(interactions: &[Interaction]) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    for interaction in interactions {
        messages.push(ChatMessage::user(&interaction.prompt));
        messages.extend(tool_messages(&interaction.tool_calls));
        if let Some(response) = interaction.response.as_deref().filter(|r| !r.is_empty()) {
            messages.push(ChatMessage::assistant(response));
        }
    }
    messages
}

/// Assistant/tool message pairs for recorded calls. Entries with an empty
/// id or name are skipped.
#[must_use]
pub fn tool_messages(records: &[ToolCallRecord]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(records.len() * 2);
    for record in records {
        if record.id.is_empty() || record.name.is_empty() {
            warn!(call_id = %record.id, tool_name = %record.name, "skipping malformed tool call record");
            continue;
        }
        messages.push(ChatMessage::assistant_tool_calls(vec![ToolCall::new(
            &record.id,
            &record.name,
            record.arguments_text(),
        )]));
        messages.push(ChatMessage::tool_result(&record.id, record.result_text()));
    }
    messages
}

/// One turn as the app shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub interaction_id: InteractionId,
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    pub response: Option<String>,
    pub products: ProviderResults,
    pub added_to_cart: Vec<ProductKey>,
    pub next: String,
}

impl From<Interaction> for HistoryEntry {
    fn from(interaction: Interaction) -> Self {
        Self {
            interaction_id: interaction.id,
            created_at: interaction.created_at,
            prompt: interaction.prompt,
            response: interaction.response,
            products: interaction.provider_results,
            added_to_cart: interaction.added_to_cart,
            next: interaction.next,
        }
    }
}

/// App-facing history of a session, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError` if the log cannot be read.
pub async fn app_history<L: InteractionLog + ?Sized>(
    log: &L,
    session_id: SessionId,
) -> Result<Vec<HistoryEntry>, RepositoryError> {
    Ok(log
        .find_ordered(session_id)
        .await?
        .into_iter()
        .map(HistoryEntry::from)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use cartwise_core::{Country, NextStep, UserId};

    use crate::db::{MemoryStore, SessionStore};
    use crate::llm::Role;
    use crate::models::{NewInteraction, TokenUsage};

    use super::*;

    fn record(id: &str, name: &str, result: serde_json::Value) -> ToolCallRecord {
        ToolCallRecord {
            id: id.to_string(),
            name: name.to_string(),
            arguments: json!({"productIds": ["amazon:B1"]}),
            result,
            is_error: false,
        }
    }

    fn new_interaction(
        session_id: SessionId,
        prompt: &str,
        response: Option<&str>,
        tool_calls: Vec<ToolCallRecord>,
    ) -> NewInteraction {
        NewInteraction {
            session_id,
            prompt: prompt.to_string(),
            response: response.map(ToString::to_string),
            tool_calls,
            provider_results: ProviderResults::new(),
            search_keywords: vec![],
            added_to_cart: vec![],
            next: NextStep::Complete,
            model: None,
            usage: TokenUsage::default(),
        }
    }

    async fn seeded() -> (MemoryStore, SessionId) {
        let store = MemoryStore::new();
        let session = store
            .create_session(UserId::generate(), &Country::parse("ae").unwrap())
            .await
            .unwrap();
        store
            .create_interaction(new_interaction(session.id, "hi", Some("Hello!"), vec![]))
            .await
            .unwrap();
        store
            .create_interaction(new_interaction(
                session.id,
                "show me",
                None,
                vec![
                    record("call_1", "display_products", json!("Displayed 1 products")),
                    record("", "display_products", json!("lost")),
                    record("call_2", "get_product_details", json!({"brand": "Acme"})),
                ],
            ))
            .await
            .unwrap();
        (store, session.id)
    }

    #[tokio::test]
    async fn test_replay_shape() {
        let (store, session_id) = seeded().await;

        let messages = replay(&store, session_id).await.unwrap();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();

        assert_eq!(
            roles,
            [
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::Assistant,
                Role::Tool
            ]
        );
        assert_eq!(messages[3].tool_calls[0].id, "call_1");
        assert_eq!(messages[4].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[4].content.as_deref(), Some("Displayed 1 products"));
        assert_eq!(messages[6].content.as_deref(), Some(r#"{"brand":"Acme"}"#));
        assert_eq!(
            messages[3].tool_calls[0].function.arguments,
            r#"{"productIds":["amazon:B1"]}"#
        );
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let (store, session_id) = seeded().await;

        let first = serde_json::to_string(&replay(&store, session_id).await.unwrap()).unwrap();
        let second = serde_json::to_string(&replay(&store, session_id).await.unwrap()).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_replay_skips_deleted() {
        let (store, session_id) = seeded().await;
        let first = store.find_ordered(session_id).await.unwrap()[0].id;
        store.soft_delete_interaction(first).await.unwrap();

        let messages = replay(&store, session_id).await.unwrap();
        assert_eq!(messages[0].content.as_deref(), Some("show me"));
    }

    #[tokio::test]
    async fn test_app_history() {
        let (store, session_id) = seeded().await;

        let history = app_history(&store, session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].response.as_deref(), Some("Hello!"));
        assert_eq!(history[1].next, "complete");
    }
}
