//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::AssistantConfig;
use crate::db::{PgStore, Store};
use crate::llm::{ChatModel, LlmError, OpenAiClient};
use crate::marketplace::{
    AmazonProvider, MarketplaceProvider, Marketplaces, NoonProvider, ProviderError, ScrapingClient,
};
use crate::services::{Catalog, TurnEngine};
use crate::tools::ToolRegistry;

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("model client: {0}")]
    Model(#[from] LlmError),
    #[error("scraping client: {0}")]
    Scraper(#[from] ProviderError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AssistantConfig,
    pool: Option<PgPool>,
    store: Arc<dyn Store>,
    engine: TurnEngine,
}

impl AppState {
    /// Create the production state: Postgres store, OpenAI client and the
    /// scraping-backed marketplace providers.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: AssistantConfig, pool: PgPool) -> Result<Self, StateError> {
        let model = Arc::new(OpenAiClient::new(&config.openai)?);
        let scraper = ScrapingClient::new(&config.scraper)?;
        let providers: Vec<Arc<dyn MarketplaceProvider>> = vec![
            Arc::new(AmazonProvider::new(scraper.clone())),
            Arc::new(NoonProvider::new(scraper)),
        ];
        let store = Arc::new(PgStore::new(pool.clone()));

        Ok(Self::from_parts(
            config,
            Some(pool),
            store,
            model,
            providers,
        ))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: AssistantConfig,
        pool: Option<PgPool>,
        store: Arc<dyn Store>,
        model: Arc<dyn ChatModel>,
        providers: Vec<Arc<dyn MarketplaceProvider>>,
    ) -> Self {
        let timeout: Duration = config.scraper.timeout;
        let limit = config.marketplaces.search_result_limit;
        let marketplaces = Marketplaces::new(providers, &config.marketplaces, timeout);
        let catalog = Catalog::new(store.clone(), marketplaces);
        let tools = ToolRegistry::with_defaults(&catalog, limit);
        let engine = TurnEngine::new(store.clone(), model, catalog, tools, limit);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                store,
                engine,
            }),
        }
    }

    /// Get a reference to the assistant configuration.
    #[must_use]
    pub fn config(&self) -> &AssistantConfig {
        &self.inner.config
    }

    /// Get the database pool, when running against Postgres.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Get the persistent store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get the turn engine.
    #[must_use]
    pub fn engine(&self) -> &TurnEngine {
        &self.inner.engine
    }
}
