//! Language model integration.
//!
//! The orchestrator only sees the [`ChatModel`] trait; [`OpenAiClient`] is the
//! production implementation against an OpenAI-compatible
//! `/chat/completions` endpoint.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::OpenAiClient;
pub use error::LlmError;
pub use types::{ChatMessage, FunctionCall, ModelReply, Role, ToolCall, ToolDefinition};

/// A chat model that can answer with text or tool calls.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model id recorded on interactions.
    fn model_id(&self) -> &str;

    /// Complete a transcript with the given tools available.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` when the call fails after any retries the
    /// implementation performs.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError>;
}
