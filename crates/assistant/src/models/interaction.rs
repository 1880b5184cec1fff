//! Interaction log models.
//!
//! One [`Interaction`] is written per logical turn and patched in place as the
//! turn advances through its resumable steps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartwise_core::{InteractionId, NextStep, Platform, ProductKey, SessionId, UnknownStep};

use super::ProductRecord;

/// Search results gathered during a turn, per platform.
pub type ProviderResults = BTreeMap<Platform, Vec<ProductRecord>>;

/// A single tool invocation and the result returned to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Model-assigned call id.
    pub id: String,
    pub name: String,
    /// Parsed arguments, or the raw argument string when it was not JSON.
    pub arguments: serde_json::Value,
    /// Result returned to the model.
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallRecord {
    /// Arguments serialized the way the model originally sent them.
    #[must_use]
    pub fn arguments_text(&self) -> String {
        json_text(&self.arguments)
    }

    /// Result serialized for a tool message.
    #[must_use]
    pub fn result_text(&self) -> String {
        json_text(&self.result)
    }
}

/// Strings are returned verbatim, everything else as compact JSON.
fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Token accounting for model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A persisted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub session_id: SessionId,
    /// Insertion order; breaks ties between equal timestamps.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub prompt: String,
    pub response: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub provider_results: ProviderResults,
    pub search_keywords: Vec<Vec<String>>,
    pub added_to_cart: Vec<ProductKey>,
    /// Raw resumption marker, kept as stored.
    pub next: String,
    pub model: Option<String>,
    pub usage: TokenUsage,
    pub is_deleted: bool,
}

impl Interaction {
    /// Parse the stored resumption marker.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStep` when the marker names no known step.
    pub fn next_step(&self) -> Result<NextStep, UnknownStep> {
        self.next.parse()
    }

    /// The keyword set of the most recent search in this turn.
    #[must_use]
    pub fn last_keywords(&self) -> Option<&[String]> {
        self.search_keywords.last().map(Vec::as_slice)
    }
}

/// Fields for the first write of a turn.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub session_id: SessionId,
    pub prompt: String,
    pub response: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub provider_results: ProviderResults,
    pub search_keywords: Vec<Vec<String>>,
    pub added_to_cart: Vec<ProductKey>,
    pub next: NextStep,
    pub model: Option<String>,
    pub usage: TokenUsage,
}

/// Partial update of a turn; only `Some` fields are applied.
#[derive(Debug, Clone, Default)]
pub struct InteractionPatch {
    pub response: Option<String>,
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    pub provider_results: Option<ProviderResults>,
    pub search_keywords: Option<Vec<Vec<String>>>,
    pub added_to_cart: Option<Vec<ProductKey>>,
    pub next: Option<NextStep>,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl InteractionPatch {
    /// Apply this patch to an in-memory interaction.
    pub fn apply_to(self, interaction: &mut Interaction) {
        if let Some(response) = self.response {
            interaction.response = Some(response);
        }
        if let Some(tool_calls) = self.tool_calls {
            interaction.tool_calls = tool_calls;
        }
        if let Some(provider_results) = self.provider_results {
            interaction.provider_results = provider_results;
        }
        if let Some(search_keywords) = self.search_keywords {
            interaction.search_keywords = search_keywords;
        }
        if let Some(added_to_cart) = self.added_to_cart {
            interaction.added_to_cart = added_to_cart;
        }
        if let Some(next) = self.next {
            interaction.next = next.as_str().to_string();
        }
        if let Some(model) = self.model {
            interaction.model = Some(model);
        }
        if let Some(usage) = self.usage {
            interaction.usage = usage;
        }
    }
}
