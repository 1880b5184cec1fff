//! Turn engine: the conversational tool-calling loop.
//!
//! A turn starts with [`TurnEngine::send_message`]. When the model searches,
//! the turn is persisted half-done with a resumption marker and the partial
//! results are returned immediately; the client then calls
//! [`TurnEngine::resume`] until the marker reaches `complete`.
//!
//! ```text
//! send_message ──► awaiting_model ◄──► tool_execution
//!                        │                  │ (search ran)
//!                        ▼                  ▼
//!                     complete    awaiting_secondary_step
//!                        ▲                  │ resume
//!                        └──────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use cartwise_core::{InteractionId, NextStep, ProductKey, SessionId, UnknownStep, UserId};

use crate::db::{RepositoryError, Store};
use crate::llm::{ChatMessage, ChatModel, ModelReply, ToolCall, ToolDefinition};
use crate::marketplace::SearchStage;
use crate::models::{
    Interaction, InteractionPatch, NewInteraction, ProductRecord, ProviderResults, SavedItem,
    Session, TokenUsage, ToolCallRecord,
};
use crate::tools::args::{self, SearchArgs};
use crate::tools::schema::{TOOL_SCHEMA_VERSION, tool_definitions};
use crate::tools::{
    ClientPayload, ToolKind, ToolOutcome, ToolRegistry, TurnContext, format_results_table,
    search_query,
};

use super::catalog::Catalog;
use super::history;
use super::prompts;

/// Upper bound on model calls within one step.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Reply used when the model cannot be reached.
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Result recorded for search calls beyond the first in a turn.
const IGNORED_SEARCH: &str = "Ignored: only one search runs per reply. Results of the first search are on their way.";

/// Errors that end a turn request.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("session not found")]
    SessionNotFound,

    #[error("interaction not found")]
    InteractionNotFound,

    #[error("message must not be empty")]
    EmptyMessage,

    /// A stored marker names no known step.
    #[error("interaction {id} has unknown resumption marker {marker:?}")]
    ConsistencyViolation { id: InteractionId, marker: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to render prompt: {0}")]
    Prompt(#[from] askama::Error),
}

/// Where a turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingModel,
    ToolExecution,
    AwaitingSecondaryStep,
    Complete,
}

impl TurnPhase {
    /// Phase a turn rests in after persisting `next`.
    #[must_use]
    pub const fn resting(next: NextStep) -> Self {
        if next.is_terminal() {
            Self::Complete
        } else {
            Self::AwaitingSecondaryStep
        }
    }
}

/// Images shown for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductImages {
    pub product: ProductKey,
    pub urls: Vec<String>,
}

/// What a turn step returns to the app.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub interaction_id: InteractionId,
    pub session_id: SessionId,
    pub message: Option<String>,
    /// Search results produced by this step, per platform.
    pub products: ProviderResults,
    pub displayed: Vec<ProductRecord>,
    pub images: Vec<ProductImages>,
    pub added_to_cart: Vec<SavedItem>,
    /// Stored resumption marker after this step.
    pub next: String,
    pub phase: TurnPhase,
}

impl TurnResult {
    fn new(interaction: &Interaction, payloads: Vec<ClientPayload>) -> Self {
        let phase = interaction
            .next_step()
            .map_or(TurnPhase::Complete, TurnPhase::resting);
        let mut result = Self {
            interaction_id: interaction.id,
            session_id: interaction.session_id,
            message: interaction.response.clone(),
            products: ProviderResults::new(),
            displayed: Vec::new(),
            images: Vec::new(),
            added_to_cart: Vec::new(),
            next: interaction.next.clone(),
            phase,
        };
        for payload in payloads {
            result.absorb(payload);
        }
        result
    }

    /// A step that did nothing; echoes the stored state.
    fn noop(interaction: &Interaction) -> Self {
        Self {
            message: None,
            ..Self::new(interaction, Vec::new())
        }
    }

    fn absorb(&mut self, payload: ClientPayload) {
        match payload {
            ClientPayload::SearchResults { results } => merge_results(&mut self.products, results),
            ClientPayload::Products { products } => self.displayed.extend(products),
            ClientPayload::Images { product, urls } => {
                self.images.push(ProductImages { product, urls });
            }
            ClientPayload::AddedToCart { items } => self.added_to_cart.extend(items),
        }
    }
}

/// Mutable bookkeeping of one step.
#[derive(Debug, Default)]
struct StepState {
    records: Vec<ToolCallRecord>,
    provider_results: ProviderResults,
    search_keywords: Vec<Vec<String>>,
    added_to_cart: Vec<ProductKey>,
    payloads: Vec<ClientPayload>,
    usage: TokenUsage,
    model: Option<String>,
    searched: bool,
}

impl StepState {
    fn absorb(&mut self, outcome: ToolOutcome) {
        let ToolOutcome {
            record,
            payload,
            effects,
        } = outcome;

        if let Some(keywords) = effects.search_keywords {
            self.search_keywords.push(keywords);
        }
        merge_results(&mut self.provider_results, effects.provider_results);
        for key in effects.added_to_cart {
            if !self.added_to_cart.contains(&key) {
                self.added_to_cart.push(key);
            }
        }
        if let Some(payload) = payload {
            self.payloads.push(payload);
        }
        self.records.push(record);
    }

    fn note_reply(&mut self, reply: &ModelReply, fallback_model: &str) {
        self.usage += reply.usage;
        let model = if reply.model.is_empty() {
            fallback_model
        } else {
            &reply.model
        };
        self.model = Some(model.to_string());
    }
}

fn merge_results(into: &mut ProviderResults, from: ProviderResults) {
    for (platform, products) in from {
        into.entry(platform).or_default().extend(products);
    }
}

/// How a model loop ended.
enum LoopEnd {
    /// The model answered in text (possibly empty).
    Answered(Option<String>),
    /// A search ran; the turn continues on resume.
    Searched(Option<String>),
    /// The model could not be reached.
    Failed,
}

// =============================================================================
// Engine
// =============================================================================

/// Runs turns against the model, the tools and the interaction log.
#[derive(Clone)]
pub struct TurnEngine {
    inner: Arc<TurnEngineInner>,
}

struct TurnEngineInner {
    store: Arc<dyn Store>,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    catalog: Catalog,
    search_result_limit: usize,
}

impl TurnEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn ChatModel>,
        catalog: Catalog,
        tools: ToolRegistry,
        search_result_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(TurnEngineInner {
                store,
                model,
                tools,
                catalog,
                search_result_limit,
            }),
        }
    }

    /// Start a turn with a user message.
    ///
    /// Model failures do not fail the turn: the user gets [`FALLBACK_REPLY`]
    /// and the turn completes.
    ///
    /// # Errors
    ///
    /// Returns `TurnError::SessionNotFound` for unknown, disabled or foreign
    /// sessions, and `TurnError::Repository` when storage fails.
    #[instrument(skip(self, text), fields(session_id = %session_id, user_id = %user_id))]
    pub async fn send_message(
        &self,
        user_id: UserId,
        session_id: SessionId,
        text: &str,
    ) -> Result<TurnResult, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let session = self.load_session(user_id, session_id).await?;
        let ctx = TurnContext::new(user_id, &session);

        let mut messages = vec![ChatMessage::system(prompts::system_prompt(&session.country)?)];
        messages.extend(history::replay(self.inner.store.as_ref(), session_id).await?);
        messages.push(ChatMessage::user(text));

        let definitions = tool_definitions(&self.inner.tools.available(&ToolKind::ALL));
        debug!(
            tools = definitions.len(),
            schema_version = TOOL_SCHEMA_VERSION,
            history = messages.len(),
            "starting turn"
        );

        let mut state = StepState::default();
        let end = self
            .model_loop(&ctx, &mut messages, &definitions, &mut state, true)
            .await?;

        let (response, next) = match end {
            LoopEnd::Answered(text) => (text, NextStep::Complete),
            LoopEnd::Failed => (Some(FALLBACK_REPLY.to_string()), NextStep::Complete),
            LoopEnd::Searched(text) => {
                let next = if self.inner.catalog.marketplaces().has_deferred() {
                    NextStep::SecondarySearch
                } else {
                    NextStep::SecondaryStep
                };
                (text, next)
            }
        };

        let interaction = self
            .inner
            .store
            .create_interaction(NewInteraction {
                session_id,
                prompt: text.to_string(),
                response,
                tool_calls: state.records,
                provider_results: state.provider_results,
                search_keywords: state.search_keywords,
                added_to_cart: state.added_to_cart,
                next,
                model: state.model,
                usage: state.usage,
            })
            .await?;

        info!(
            interaction_id = %interaction.id,
            next = %interaction.next,
            tool_calls = interaction.tool_calls.len(),
            total_tokens = interaction.usage.total_tokens,
            "turn persisted"
        );
        Ok(TurnResult::new(&interaction, state.payloads))
    }

    /// Continue a turn at its stored step.
    ///
    /// Completed turns and turns with an unrecognized marker are answered
    /// with a no-op result echoing the stored marker.
    ///
    /// # Errors
    ///
    /// Returns `TurnError::InteractionNotFound` for unknown, deleted or
    /// foreign interactions, and `TurnError::Repository` when storage fails.
    #[instrument(skip(self), fields(interaction_id = %interaction_id, user_id = %user_id))]
    pub async fn resume(
        &self,
        user_id: UserId,
        interaction_id: InteractionId,
    ) -> Result<TurnResult, TurnError> {
        let interaction = self
            .inner
            .store
            .find_interaction(interaction_id)
            .await?
            .filter(|i| !i.is_deleted)
            .ok_or(TurnError::InteractionNotFound)?;
        let session = self
            .load_session(user_id, interaction.session_id)
            .await
            .map_err(|e| match e {
                TurnError::SessionNotFound => TurnError::InteractionNotFound,
                other => other,
            })?;
        let ctx = TurnContext::new(user_id, &session);

        match interaction.next_step() {
            Ok(NextStep::SecondarySearch) => self.secondary_search(&ctx, interaction).await,
            Ok(NextStep::SecondaryStep) => self.secondary_step(&ctx, &session, interaction).await,
            Ok(NextStep::Complete) => {
                debug!("turn already complete");
                Ok(TurnResult::noop(&interaction))
            }
            Err(UnknownStep(marker)) => {
                let violation = TurnError::ConsistencyViolation {
                    id: interaction.id,
                    marker,
                };
                error!(error = %violation, "cannot resume turn");
                Ok(TurnResult::noop(&interaction))
            }
        }
    }

    /// Search the deferred providers with the turn's last keywords.
    async fn secondary_search(
        &self,
        ctx: &TurnContext,
        interaction: Interaction,
    ) -> Result<TurnResult, TurnError> {
        let marketplaces = self.inner.catalog.marketplaces();
        let mut records = interaction.tool_calls.clone();
        let search_index = acted_search(&records);

        let params = search_index
            .and_then(|idx| records.get(idx))
            .and_then(|record| args::parse::<SearchArgs>(&record.arguments).ok())
            .and_then(|args| args.validate().ok());
        let keywords = interaction.last_keywords().map(<[String]>::to_vec);

        let results = match (params, keywords) {
            (Some(mut params), Some(keywords)) => {
                params.keywords = keywords;
                let query = search_query(ctx, &params);
                marketplaces.search(SearchStage::Deferred, &query).await
            }
            _ => {
                warn!("no stored search to continue; skipping deferred providers");
                ProviderResults::new()
            }
        };
        self.inner.catalog.record_results(&results).await?;

        let mut provider_results = interaction.provider_results.clone();
        merge_results(&mut provider_results, results.clone());

        let record = search_index.and_then(|idx| records.get_mut(idx));
        if let (Some(record), false) = (record, results.is_empty()) {
            let table = format_results_table(&results, self.inner.search_result_limit);
            record.result = Value::String(format!("{}\n\n{table}", record.result_text()));
        }

        let patch = InteractionPatch {
            tool_calls: Some(records),
            provider_results: Some(provider_results),
            next: Some(NextStep::SecondaryStep),
            ..InteractionPatch::default()
        };
        let updated = match self.inner.store.patch_interaction(interaction.id, patch).await {
            Ok(updated) => updated,
            Err(RepositoryError::Conflict(reason)) => {
                return self.settled(interaction.id, &reason).await;
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            platforms = marketplaces.stage(SearchStage::Deferred).len(),
            "deferred search finished"
        );
        let mut result = TurnResult::new(
            &updated,
            vec![ClientPayload::SearchResults { results }],
        );
        result.message = None;
        Ok(result)
    }

    /// Ask the model for top picks over the accumulated results.
    async fn secondary_step(
        &self,
        ctx: &TurnContext,
        session: &Session,
        interaction: Interaction,
    ) -> Result<TurnResult, TurnError> {
        let earlier: Vec<Interaction> = self
            .inner
            .store
            .find_ordered(interaction.session_id)
            .await?
            .into_iter()
            .take_while(|i| i.id != interaction.id)
            .collect();

        // This turn's calls, with the search answered by the full table.
        let mut records = interaction.tool_calls.clone();
        if let Some(record) = acted_search(&records).and_then(|idx| records.get_mut(idx)) {
            record.result = Value::String(format_results_table(
                &interaction.provider_results,
                self.inner.search_result_limit,
            ));
        }
        let keywords = interaction.last_keywords().unwrap_or_default();

        let mut messages = vec![ChatMessage::system(prompts::system_prompt(&session.country)?)];
        messages.extend(history::transcript(&earlier));
        messages.push(ChatMessage::user(&interaction.prompt));
        messages.extend(history::tool_messages(&records));
        messages.push(ChatMessage::system(prompts::top_picks_prompt(keywords)?));

        let definitions = tool_definitions(&self.inner.tools.available(&ToolKind::follow_up()));

        let mut state = StepState::default();
        let end = self
            .model_loop(ctx, &mut messages, &definitions, &mut state, false)
            .await?;
        let response = match end {
            LoopEnd::Answered(text) | LoopEnd::Searched(text) => text,
            LoopEnd::Failed => Some(FALLBACK_REPLY.to_string()),
        };

        let mut tool_calls = interaction.tool_calls.clone();
        tool_calls.extend(state.records);
        let mut added_to_cart = interaction.added_to_cart.clone();
        for key in state.added_to_cart {
            if !added_to_cart.contains(&key) {
                added_to_cart.push(key);
            }
        }

        let patch = InteractionPatch {
            response,
            tool_calls: Some(tool_calls),
            added_to_cart: Some(added_to_cart),
            next: Some(NextStep::Complete),
            model: state.model,
            usage: Some(interaction.usage + state.usage),
            ..InteractionPatch::default()
        };
        let updated = match self.inner.store.patch_interaction(interaction.id, patch).await {
            Ok(updated) => updated,
            Err(RepositoryError::Conflict(reason)) => {
                return self.settled(interaction.id, &reason).await;
            }
            Err(e) => return Err(e.into()),
        };

        info!(total_tokens = updated.usage.total_tokens, "turn complete");
        Ok(TurnResult::new(&updated, state.payloads))
    }

    /// Answer a resume whose step was finished by an overlapping resume
    /// with the turn as stored.
    async fn settled(
        &self,
        interaction_id: InteractionId,
        reason: &str,
    ) -> Result<TurnResult, TurnError> {
        let stored = self
            .inner
            .store
            .find_interaction(interaction_id)
            .await?
            .filter(|i| !i.is_deleted)
            .ok_or(TurnError::InteractionNotFound)?;
        info!(reason, next = %stored.next, "step already settled by another resume");
        Ok(TurnResult::noop(&stored))
    }

    /// Call the model and run its tool calls until it answers in text, a
    /// search runs, or [`MAX_TOOL_ROUNDS`] is reached.
    async fn model_loop(
        &self,
        ctx: &TurnContext,
        messages: &mut Vec<ChatMessage>,
        definitions: &[ToolDefinition],
        state: &mut StepState,
        allow_search: bool,
    ) -> Result<LoopEnd, TurnError> {
        let mut last_text = None;

        for round in 0..MAX_TOOL_ROUNDS {
            debug!(round, phase = ?TurnPhase::AwaitingModel, "calling model");
            let reply = match self.inner.model.complete(messages, definitions).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, round, "model unavailable, using fallback reply");
                    return Ok(LoopEnd::Failed);
                }
            };
            state.note_reply(&reply, self.inner.model.model_id());

            if !reply.has_tool_calls() {
                return Ok(LoopEnd::Answered(reply.content));
            }

            debug!(
                round,
                phase = ?TurnPhase::ToolExecution,
                calls = reply.tool_calls.len(),
                "running tool calls"
            );
            messages.push(ChatMessage {
                content: reply.content.clone(),
                ..ChatMessage::assistant_tool_calls(reply.tool_calls.clone())
            });
            self.run_calls(ctx, &reply.tool_calls, allow_search, state, messages)
                .await?;

            if state.searched {
                return Ok(LoopEnd::Searched(reply.content));
            }
            last_text = reply.content;
        }

        warn!(rounds = MAX_TOOL_ROUNDS, "tool round limit reached");
        Ok(LoopEnd::Answered(last_text))
    }

    /// Dispatch calls in emitted order; every call id gets a tool message.
    async fn run_calls(
        &self,
        ctx: &TurnContext,
        calls: &[ToolCall],
        allow_search: bool,
        state: &mut StepState,
        messages: &mut Vec<ChatMessage>,
    ) -> Result<(), TurnError> {
        for call in calls {
            let is_search = call.function.name == ToolKind::SearchProducts.as_str();
            let outcome = if is_search && (!allow_search || state.searched) {
                debug!(call_id = %call.id, "ignoring extra search call");
                ToolOutcome::answered(call, IGNORED_SEARCH, false)
            } else {
                let outcome = self.inner.tools.dispatch(call, ctx).await?;
                if is_search && !outcome.record.is_error {
                    state.searched = true;
                }
                outcome
            };

            messages.push(ChatMessage::tool_result(
                &outcome.record.id,
                outcome.record.result_text(),
            ));
            state.absorb(outcome);
        }
        Ok(())
    }

    async fn load_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Session, TurnError> {
        self.inner
            .store
            .find_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id && !s.is_disabled)
            .ok_or(TurnError::SessionNotFound)
    }
}

/// Index of the search call that actually ran in a turn.
fn acted_search(records: &[ToolCallRecord]) -> Option<usize> {
    records.iter().position(|record| {
        record.name == ToolKind::SearchProducts.as_str()
            && !record.is_error
            && record.result_text() != IGNORED_SEARCH
    })
}
