//! Product cache access shared by the tools and the turn engine.

use std::sync::Arc;

use tracing::{debug, instrument};

use cartwise_core::{Country, Platform, ProductKey};

use crate::db::{RepositoryError, Store};
use crate::marketplace::Marketplaces;
use crate::models::{ProductDetail, ProductRecord, ProviderResults};
use crate::tools::ToolError;

/// Product cache plus the providers that fill it.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    marketplaces: Marketplaces,
}

impl Catalog {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, marketplaces: Marketplaces) -> Self {
        Self {
            store,
            marketplaces,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn marketplaces(&self) -> &Marketplaces {
        &self.marketplaces
    }

    /// Upsert every product of a fan-out into the cache.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the upsert fails.
    pub async fn record_results(&self, results: &ProviderResults) -> Result<(), RepositoryError> {
        let products: Vec<ProductRecord> = results.values().flatten().cloned().collect();
        if products.is_empty() {
            return Ok(());
        }
        self.store.upsert_products(&products).await
    }

    /// Resolve a model-supplied product id within a country.
    ///
    /// `platform:external_id` resolves exactly. A bare id is looked up on
    /// each configured platform in order, then any other known platform.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a lookup fails.
    #[instrument(skip(self), fields(country = %country))]
    pub async fn resolve(
        &self,
        country: &Country,
        id: &str,
    ) -> Result<Option<ProductRecord>, RepositoryError> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }

        if let Some((prefix, external_id)) = id.split_once(':')
            && let Ok(platform) = prefix.parse::<Platform>()
        {
            let key = ProductKey::new(platform, country.clone(), external_id.trim());
            return self.store.find_product(&key).await;
        }

        for platform in self.search_order() {
            let key = ProductKey::new(platform, country.clone(), id);
            if let Some(product) = self.store.find_product(&key).await? {
                return Ok(Some(product));
            }
        }

        debug!(id, "product id did not resolve");
        Ok(None)
    }

    fn search_order(&self) -> Vec<Platform> {
        let mut order = self.marketplaces.resolution_order();
        for platform in Platform::ALL {
            if !order.contains(&platform) {
                order.push(platform);
            }
        }
        order
    }

    /// Extended fields for a cached product.
    ///
    /// Cached fields are reused; otherwise the owning provider is asked and
    /// the result is written back to the cache.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Provider` if the lookup fails and
    /// `ToolError::Repository` if the write-back fails.
    #[instrument(skip(self, product), fields(product = %product.key()))]
    pub async fn detail(&self, product: &ProductRecord) -> Result<ProductDetail, ToolError> {
        if let Some(detail) = product.detail.as_ref().filter(|d| !d.is_empty()) {
            debug!("using cached product detail");
            return Ok(detail.clone());
        }

        let key = product.key();
        let detail = self.marketplaces.detail(&key).await?;
        self.store.set_product_detail(&key, &detail).await?;
        Ok(detail)
    }
}
