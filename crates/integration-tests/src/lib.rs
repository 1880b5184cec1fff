//! Integration test harness for Cartwise.
//!
//! Runs the assistant against an in-memory store, a scripted chat model and
//! stub marketplace providers, so the end-to-end scenarios need no database
//! or network.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwise-integration-tests
//! ```

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use cartwise_assistant::config::{
    AssistantConfig, LogFormat, MarketplaceConfig, OpenAiConfig, ScraperConfig,
};
use cartwise_assistant::db::{MemoryStore, SessionStore};
use cartwise_assistant::llm::{ChatMessage, ChatModel, LlmError, ModelReply, ToolCall, ToolDefinition};
use cartwise_assistant::marketplace::{MarketplaceProvider, ProviderError, SearchQuery};
use cartwise_assistant::models::{ProductDetail, ProductRecord, Session};
use cartwise_assistant::services::TurnEngine;
use cartwise_assistant::state::AppState;
use cartwise_core::{Country, Platform, UserId};

// =============================================================================
// Scripted Model
// =============================================================================

/// A chat model that replays canned replies in order.
///
/// Once the script runs out every call fails with a timeout.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    requests: Mutex<Vec<Recorded>>,
    latency: Option<Duration>,
}

/// One recorded model call.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            latency: None,
        })
    }

    /// A model that waits `latency` before answering each call, so
    /// concurrent turns interleave.
    #[must_use]
    pub fn slow(replies: Vec<Result<ModelReply, LlmError>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            latency: Some(latency),
        })
    }

    /// Every call made so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, LlmError> {
        self.requests.lock().expect("requests lock").push(Recorded {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.function.name.clone()).collect(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(LlmError::Timeout(60)))
    }
}

/// A reply carrying tool calls only.
#[must_use]
pub fn calls(calls: &[(&str, &str, &str)]) -> Result<ModelReply, LlmError> {
    Ok(ModelReply::tool_calls(
        calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, *args))
            .collect(),
    ))
}

/// A plain text reply.
#[must_use]
pub fn text(content: &str) -> Result<ModelReply, LlmError> {
    Ok(ModelReply::text(content))
}

// =============================================================================
// Stub Providers
// =============================================================================

/// A marketplace provider returning fixed listings.
pub struct StubProvider {
    platform: Platform,
    listings: Vec<ProductRecord>,
    detail: ProductDetail,
    failing: bool,
    searches: AtomicUsize,
    queries: Mutex<Vec<SearchQuery>>,
}

impl StubProvider {
    #[must_use]
    pub fn returning(platform: Platform, listings: Vec<ProductRecord>) -> Arc<Self> {
        Arc::new(Self {
            platform,
            listings,
            detail: ProductDetail::default(),
            failing: false,
            searches: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn with_detail(
        platform: Platform,
        listings: Vec<ProductRecord>,
        detail: ProductDetail,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform,
            listings,
            detail,
            failing: false,
            searches: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    /// A provider whose every call fails with a 503.
    #[must_use]
    pub fn failing(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            listings: Vec::new(),
            detail: ProductDetail::default(),
            failing: true,
            searches: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    /// Number of search attempts, retries included.
    #[must_use]
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Queries received, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl MarketplaceProvider for StubProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductRecord>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .expect("queries lock")
            .push(query.clone());
        if self.failing {
            return Err(ProviderError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(self.listings.clone())
    }

    async fn detail(
        &self,
        _country: &Country,
        _external_id: &str,
    ) -> Result<ProductDetail, ProviderError> {
        if self.failing {
            return Err(ProviderError::Timeout(1));
        }
        Ok(self.detail.clone())
    }
}

/// A listing in the `ae` marketplace priced in AED.
#[must_use]
pub fn product(platform: Platform, id: &str, name: &str, price: i64) -> ProductRecord {
    ProductRecord {
        platform,
        country: country(),
        external_id: id.to_string(),
        name: name.to_string(),
        images: vec![format!("https://images.example/{id}.jpg")],
        currency: "AED".to_string(),
        price: Decimal::new(price, 0),
        rating: Some(4.5),
        detail: None,
    }
}

/// The test marketplace country.
#[must_use]
pub fn country() -> Country {
    Country::parse("ae").expect("valid country")
}

// =============================================================================
// Context
// =============================================================================

/// Configuration with placeholder secrets and the given provider stages.
#[must_use]
pub fn test_config(primary: Vec<Platform>, deferred: Vec<Platform>) -> AssistantConfig {
    AssistantConfig {
        database_url: "postgres://unused".to_string().into(),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3002,
        openai: OpenAiConfig {
            api_key: "test-key".to_string().into(),
            model: "scripted-model".to_string(),
            base_url: "http://localhost:0".to_string(),
            timeout: Duration::from_secs(5),
        },
        scraper: ScraperConfig {
            api_key: "test-key".to_string().into(),
            base_url: "http://localhost:0".to_string(),
            timeout: Duration::from_secs(5),
        },
        marketplaces: MarketplaceConfig {
            primary,
            deferred,
            default_country: country(),
            search_result_limit: 10,
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
        log_format: LogFormat::Text,
    }
}

/// A wired assistant plus handles on its fakes.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub user_id: UserId,
}

impl TestContext {
    /// Wire the assistant with every provider searched up front.
    #[must_use]
    pub fn new(model: Arc<ScriptedModel>, providers: Vec<Arc<StubProvider>>) -> Self {
        let primary = providers.iter().map(|p| p.platform).collect();
        Self::staged(model, providers, primary, Vec::new())
    }

    /// Wire the assistant with explicit provider stages.
    #[must_use]
    pub fn staged(
        model: Arc<ScriptedModel>,
        providers: Vec<Arc<StubProvider>>,
        primary: Vec<Platform>,
        deferred: Vec<Platform>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let providers: Vec<Arc<dyn MarketplaceProvider>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn MarketplaceProvider>)
            .collect();
        let state = AppState::from_parts(
            test_config(primary, deferred),
            None,
            store.clone(),
            model.clone(),
            providers,
        );

        Self {
            state,
            store,
            model,
            user_id: UserId::generate(),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &TurnEngine {
        self.state.engine()
    }

    /// Create a session for the context's user.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory store rejects the insert.
    pub async fn session(&self) -> Session {
        self.store
            .create_session(self.user_id, &country())
            .await
            .expect("create session")
    }
}
