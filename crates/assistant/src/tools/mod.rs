//! Tool registry and dispatcher.
//!
//! Model tool calls are routed by name to a [`ToolHandler`]. A handler turns
//! the call into three things:
//!
//! - the result shown to the model (recorded on the interaction)
//! - an optional [`ClientPayload`] for the app (products, images, cart)
//! - [`ToolEffects`] folded into the interaction (keywords, results, cart keys)
//!
//! Tool failures never abort a turn. Only storage failures propagate.

pub mod args;
mod cart;
mod details;
mod display;
mod images;
pub mod schema;
mod search;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{instrument, warn};

use cartwise_core::{Country, ProductKey, SessionId, UserId};

use crate::db::RepositoryError;
use crate::llm::ToolCall;
use crate::marketplace::ProviderError;
use crate::models::{ProductRecord, ProviderResults, SavedItem, Session, ToolCallRecord};
use crate::services::catalog::Catalog;

pub use cart::AddToCartTool;
pub use details::ProductDetailsTool;
pub use display::DisplayProductsTool;
pub use images::ProductImagesTool;
pub use search::{SearchProductsTool, format_results_table, search_query};

/// A tool the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    SearchProducts,
    DisplayProducts,
    GetProductDetails,
    DisplayProductImages,
    AddToCart,
}

impl ToolKind {
    /// Every tool, in the order presented to the model.
    pub const ALL: [Self; 5] = [
        Self::SearchProducts,
        Self::DisplayProducts,
        Self::GetProductDetails,
        Self::DisplayProductImages,
        Self::AddToCart,
    ];

    /// Function name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SearchProducts => "search_products",
            Self::DisplayProducts => "display_products",
            Self::GetProductDetails => "get_product_details",
            Self::DisplayProductImages => "display_product_images",
            Self::AddToCart => "add_to_cart",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Tools offered after search results are in (top picks step).
    #[must_use]
    pub fn follow_up() -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|kind| *kind != Self::SearchProducts)
            .collect()
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by tool handlers.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A marketplace call failed.
    #[error("marketplace unavailable: {0}")]
    Provider(#[from] ProviderError),

    /// A referenced product is not in the cache.
    #[error("product {0} not found")]
    NotFound(String),

    /// The model sent malformed arguments.
    #[error("invalid arguments: {0}")]
    Argument(String),

    /// Storage failed; aborts the turn.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Immutable per-turn facts handed to every tool.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub country: Country,
    /// Whether the first search of the turn may rename the session.
    pub rename_session: bool,
}

impl TurnContext {
    #[must_use]
    pub fn new(user_id: UserId, session: &Session) -> Self {
        Self {
            user_id,
            session_id: session.id,
            country: session.country.clone(),
            rename_session: session.has_default_title(),
        }
    }
}

/// Data for the app, never shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    SearchResults { results: ProviderResults },
    Products { products: Vec<ProductRecord> },
    Images { product: ProductKey, urls: Vec<String> },
    AddedToCart { items: Vec<SavedItem> },
}

/// State changes a tool call contributes to its interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolEffects {
    pub search_keywords: Option<Vec<String>>,
    pub provider_results: ProviderResults,
    pub added_to_cart: Vec<ProductKey>,
}

/// What a handler returns on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    /// Result shown to the model.
    pub result: Value,
    pub payload: Option<ClientPayload>,
    pub effects: ToolEffects,
}

impl ToolReply {
    /// A reply with only a model-facing text result.
    #[must_use]
    pub fn text(result: impl Into<String>) -> Self {
        Self {
            result: Value::String(result.into()),
            payload: None,
            effects: ToolEffects::default(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: ClientPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A dispatched tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub record: ToolCallRecord,
    pub payload: Option<ClientPayload>,
    pub effects: ToolEffects,
}

impl ToolOutcome {
    /// An outcome that only answers the call with text.
    #[must_use]
    pub fn answered(call: &ToolCall, result: impl Into<String>, is_error: bool) -> Self {
        Self {
            record: ToolCallRecord {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: parse_arguments(&call.function.arguments),
                result: Value::String(result.into()),
                is_error,
            },
            payload: None,
            effects: ToolEffects::default(),
        }
    }
}

/// A tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Run the tool with already-parsed JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns `ToolError`; only `ToolError::Repository` aborts the turn.
    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Lookup table from tool kind to handler, built once at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<ToolKind, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in tool.
    #[must_use]
    pub fn with_defaults(catalog: &Catalog, search_result_limit: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SearchProductsTool::new(
            catalog.clone(),
            search_result_limit,
        )));
        registry.register(Arc::new(DisplayProductsTool::new(catalog.clone())));
        registry.register(Arc::new(ProductDetailsTool::new(catalog.clone())));
        registry.register(Arc::new(ProductImagesTool::new(catalog.clone())));
        registry.register(Arc::new(AddToCartTool::new(catalog.clone())));
        registry
    }

    /// Register a handler, replacing any previous handler of the same kind.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Registered kinds among `kinds`, preserving their order.
    #[must_use]
    pub fn available(&self, kinds: &[ToolKind]) -> Vec<ToolKind> {
        kinds
            .iter()
            .copied()
            .filter(|kind| self.handlers.contains_key(kind))
            .collect()
    }

    /// Execute one tool call.
    ///
    /// Unknown tools, malformed arguments and provider failures are answered
    /// in the record; the call never fails the turn for those.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` when storage fails.
    #[instrument(
        skip(self, call, ctx),
        fields(tool_name = %call.function.name, call_id = %call.id, session_id = %ctx.session_id)
    )]
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &TurnContext,
    ) -> Result<ToolOutcome, RepositoryError> {
        let name = call.function.name.as_str();
        let Some(handler) = ToolKind::from_name(name).and_then(|kind| self.handlers.get(&kind))
        else {
            warn!("model called an unknown tool");
            return Ok(ToolOutcome::answered(call, format!("Tool {name} not found"), true));
        };

        let args = match serde_json::from_str::<Value>(&call.function.arguments) {
            Ok(args) => args,
            Err(e) if call.function.arguments.trim().is_empty() => {
                tracing::debug!(error = %e, "empty tool arguments");
                Value::Object(serde_json::Map::new())
            }
            Err(e) => {
                warn!(error = %e, "tool arguments are not JSON");
                return Ok(ToolOutcome::answered(
                    call,
                    format!("Error: arguments must be a JSON object ({e})"),
                    true,
                ));
            }
        };

        match handler.call(ctx, &args).await {
            Ok(reply) => Ok(ToolOutcome {
                record: ToolCallRecord {
                    id: call.id.clone(),
                    name: name.to_string(),
                    arguments: args,
                    result: reply.result,
                    is_error: false,
                },
                payload: reply.payload,
                effects: reply.effects,
            }),
            Err(ToolError::Repository(e)) => Err(e),
            Err(e) => {
                warn!(error = %e, "tool call failed");
                Ok(ToolOutcome::answered(call, format!("Error: {e}"), true))
            }
        }
    }
}

/// Arguments as JSON, or the raw string when they are not valid JSON.
#[must_use]
pub fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
