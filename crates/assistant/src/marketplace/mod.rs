//! Marketplace search and detail providers.
//!
//! # Architecture
//!
//! - Each storefront implements [`MarketplaceProvider`]; the orchestrator never
//!   talks to a provider directly
//! - [`Marketplaces`] owns the configured providers, runs the concurrent
//!   fan-out and memoizes detail lookups with `moka` (5 minute TTL)
//! - Provider failures never fail a turn: a failed provider contributes an
//!   empty result list
//!
//! Both production providers go through the same [`ScrapingClient`], which
//! forwards extraction rules to a hosted scraping service.

mod amazon;
mod noon;
mod scraping;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use moka::future::Cache;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, instrument, warn};

use cartwise_core::{Country, Platform, ProductKey};

use crate::config::MarketplaceConfig;
use crate::models::{ProductDetail, ProductRecord, ProviderResults};

pub use amazon::AmazonProvider;
pub use noon::NoonProvider;
pub use scraping::ScrapingClient;

/// Delay before the single retry of a transient provider failure.
const RETRY_DELAY_MS: u64 = 500;

/// Errors that can occur when calling a marketplace provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Call exceeded the provider deadline.
    #[error("provider call timed out after {0} seconds")]
    Timeout(u64),

    /// Scraping service returned an error status.
    #[error("scraping service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The platform has no storefront for this country.
    #[error("{platform} does not serve country {country}")]
    UnsupportedCountry { platform: Platform, country: Country },

    /// No provider registered for the platform.
    #[error("no provider configured for {0}")]
    NotConfigured(Platform),
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) | Self::UnsupportedCountry { .. } | Self::NotConfigured(_) => false,
        }
    }
}

/// A product search as issued by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub country: Country,
    pub keywords: Vec<String>,
    /// Marketplace department; providers fall back to "all departments".
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl SearchQuery {
    /// Keywords joined with single spaces.
    #[must_use]
    pub fn phrase(&self) -> String {
        self.keywords.join(" ")
    }
}

/// An external marketplace backend.
#[async_trait]
pub trait MarketplaceProvider: Send + Sync {
    fn platform(&self) -> Platform;

    /// Search listings.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on transport or parse failures.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductRecord>, ProviderError>;

    /// Fetch extended fields for one item.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on transport or parse failures.
    async fn detail(
        &self,
        country: &Country,
        external_id: &str,
    ) -> Result<ProductDetail, ProviderError>;
}

/// Which providers a search fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStage {
    /// Providers searched as soon as the model asks.
    Primary,
    /// Providers searched by the resumed `secondary_search` step.
    Deferred,
}

// =============================================================================
// Marketplaces
// =============================================================================

/// The configured provider set.
#[derive(Clone)]
pub struct Marketplaces {
    inner: Arc<MarketplacesInner>,
}

struct MarketplacesInner {
    providers: HashMap<Platform, Arc<dyn MarketplaceProvider>>,
    primary: Vec<Platform>,
    deferred: Vec<Platform>,
    timeout: Duration,
    details: Cache<ProductKey, ProductDetail>,
}

impl Marketplaces {
    /// Build the provider set.
    ///
    /// Platforms named in `config` without a registered provider are dropped
    /// with a warning.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn MarketplaceProvider>>,
        config: &MarketplaceConfig,
        timeout: Duration,
    ) -> Self {
        let providers: HashMap<_, _> = providers
            .into_iter()
            .map(|provider| (provider.platform(), provider))
            .collect();

        let registered = |platforms: &[Platform]| -> Vec<Platform> {
            platforms
                .iter()
                .copied()
                .filter(|platform| {
                    let known = providers.contains_key(platform);
                    if !known {
                        warn!(%platform, "marketplace configured without a provider");
                    }
                    known
                })
                .collect()
        };
        let primary = registered(&config.primary);
        let deferred = registered(&config.deferred);

        let details = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(MarketplacesInner {
                providers,
                primary,
                deferred,
                timeout,
                details,
            }),
        }
    }

    /// Platforms searched in a stage, in configured order.
    #[must_use]
    pub fn stage(&self, stage: SearchStage) -> &[Platform] {
        match stage {
            SearchStage::Primary => &self.inner.primary,
            SearchStage::Deferred => &self.inner.deferred,
        }
    }

    /// Whether a `secondary_search` step has anything to do.
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.inner.deferred.is_empty()
    }

    /// All platforms, primary first. Used to resolve bare product ids.
    #[must_use]
    pub fn resolution_order(&self) -> Vec<Platform> {
        self.inner
            .primary
            .iter()
            .chain(self.inner.deferred.iter())
            .copied()
            .collect()
    }

    /// Search every provider of a stage concurrently.
    ///
    /// Every platform of the stage gets an entry; a provider that fails
    /// (after one retry) or times out contributes an empty list.
    #[instrument(skip(self, query), fields(keywords = %query.phrase(), country = %query.country))]
    pub async fn search(&self, stage: SearchStage, query: &SearchQuery) -> ProviderResults {
        let calls = self.stage(stage).iter().map(|platform| async move {
            let products = match self.search_one(*platform, query).await {
                Ok(products) => {
                    debug!(%platform, count = products.len(), "provider search finished");
                    products
                }
                Err(e) => {
                    warn!(%platform, error = %e, "provider search failed");
                    Vec::new()
                }
            };
            (*platform, products)
        });

        join_all(calls).await.into_iter().collect()
    }

    async fn search_one(
        &self,
        platform: Platform,
        query: &SearchQuery,
    ) -> Result<Vec<ProductRecord>, ProviderError> {
        let provider = self
            .inner
            .providers
            .get(&platform)
            .ok_or(ProviderError::NotConfigured(platform))?;
        let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(1);

        RetryIf::spawn(
            strategy,
            || self.bounded(provider.search(query)),
            ProviderError::is_transient,
        )
        .await
    }

    /// Extended fields for a product, memoized per key.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the owning provider is not configured or
    /// the lookup fails after one retry.
    #[instrument(skip(self), fields(product = %key))]
    pub async fn detail(&self, key: &ProductKey) -> Result<ProductDetail, ProviderError> {
        if let Some(detail) = self.inner.details.get(key).await {
            debug!("Cache hit for product detail");
            return Ok(detail);
        }

        let provider = self
            .inner
            .providers
            .get(&key.platform)
            .ok_or(ProviderError::NotConfigured(key.platform))?;
        let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(1);

        let detail = RetryIf::spawn(
            strategy,
            || self.bounded(provider.detail(&key.country, &key.external_id)),
            ProviderError::is_transient,
        )
        .await?;

        self.inner.details.insert(key.clone(), detail.clone()).await;
        Ok(detail)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.inner.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout(self.inner.timeout.as_secs()))?
    }
}
