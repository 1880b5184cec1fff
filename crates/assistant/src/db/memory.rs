//! In-memory store used by tests and local tooling.
//!
//! Mirrors the `PostgreSQL` semantics that the turn engine depends on:
//! upserts keyed by `(platform, country, external_id)`, insert-if-absent
//! saved items, `(created_at, seq)` ordering and the no-patch-after-complete
//! rule.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use cartwise_core::{
    Country, InteractionId, NextStep, ProductKey, SavedList, SessionId, UserId,
};

use super::{InteractionLog, ProductStore, RepositoryError, SavedItemStore, SessionStore};
use crate::models::{
    DEFAULT_SESSION_TITLE, Interaction, InteractionPatch, NewInteraction, ProductDetail,
    ProductRecord, SavedItem, Session, TokenUsage,
};

#[derive(Default)]
struct MemoryInner {
    sessions: Vec<Session>,
    interactions: Vec<Interaction>,
    next_seq: i64,
    products: HashMap<ProductKey, ProductRecord>,
    saved_items: Vec<SavedItem>,
}

/// Store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached products.
    pub async fn product_count(&self) -> usize {
        self.inner.read().await.products.len()
    }

    /// Overwrite a stored resumption marker verbatim.
    ///
    /// Simulates rows written by builds that know other markers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the interaction doesn't exist.
    pub async fn overwrite_marker(
        &self,
        id: InteractionId,
        marker: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let interaction = inner
            .interactions
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(RepositoryError::NotFound)?;
        interaction.next = marker.to_string();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        user_id: UserId,
        country: &Country,
    ) -> Result<Session, RepositoryError> {
        let session = Session {
            id: SessionId::generate(),
            user_id,
            title: DEFAULT_SESSION_TITLE.to_string(),
            country: country.clone(),
            created_at: Utc::now(),
            is_disabled: false,
        };
        self.inner.write().await.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id && !s.is_disabled)
            .cloned()
            .collect())
    }

    async fn update_session_title(
        &self,
        id: SessionId,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)?;
        session.title = title.to_string();
        Ok(())
    }
}

#[async_trait]
impl InteractionLog for MemoryStore {
    async fn create_interaction(
        &self,
        new: NewInteraction,
    ) -> Result<Interaction, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let interaction = Interaction {
            id: InteractionId::generate(),
            session_id: new.session_id,
            seq: inner.next_seq,
            created_at: Utc::now(),
            prompt: new.prompt,
            response: new.response,
            tool_calls: new.tool_calls,
            provider_results: new.provider_results,
            search_keywords: new.search_keywords,
            added_to_cart: new.added_to_cart,
            next: new.next.as_str().to_string(),
            model: new.model,
            usage: new.usage,
            is_deleted: false,
        };
        inner.interactions.push(interaction.clone());
        Ok(interaction)
    }

    async fn patch_interaction(
        &self,
        id: InteractionId,
        patch: InteractionPatch,
    ) -> Result<Interaction, RepositoryError> {
        let mut inner = self.inner.write().await;
        let interaction = inner
            .interactions
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(RepositoryError::NotFound)?;

        if interaction.next == NextStep::Complete.as_str() {
            return Err(RepositoryError::Conflict(format!(
                "interaction {id} is already complete"
            )));
        }

        patch.apply_to(interaction);
        Ok(interaction.clone())
    }

    async fn find_ordered(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let inner = self.inner.read().await;
        let mut interactions: Vec<Interaction> = inner
            .interactions
            .iter()
            .filter(|i| i.session_id == session_id && !i.is_deleted)
            .cloned()
            .collect();
        interactions.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
        Ok(interactions)
    }

    async fn find_interaction(
        &self,
        id: InteractionId,
    ) -> Result<Option<Interaction>, RepositoryError> {
        Ok(self
            .inner
            .read()
            .await
            .interactions
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn soft_delete_interaction(&self, id: InteractionId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .interactions
            .iter_mut()
            .find(|i| i.id == id)
            .map(|i| i.is_deleted = true)
            .is_some())
    }

    async fn token_usage(&self, session_id: SessionId) -> Result<TokenUsage, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .interactions
            .iter()
            .filter(|i| i.session_id == session_id && !i.is_deleted)
            .fold(TokenUsage::default(), |acc, i| acc + i.usage))
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        for product in products {
            let key = product.key();
            let mut fresh = product.clone();
            if let Some(existing) = inner.products.get(&key) {
                fresh.detail = existing.detail.clone();
                if fresh.rating.is_none() {
                    fresh.rating = existing.rating;
                }
            }
            inner.products.insert(key, fresh);
        }
        Ok(())
    }

    async fn find_product(
        &self,
        key: &ProductKey,
    ) -> Result<Option<ProductRecord>, RepositoryError> {
        Ok(self.inner.read().await.products.get(key).cloned())
    }

    async fn set_product_detail(
        &self,
        key: &ProductKey,
        detail: &ProductDetail,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        let product = inner
            .products
            .get_mut(key)
            .ok_or(RepositoryError::NotFound)?;
        product.detail = Some(detail.clone());
        Ok(())
    }
}

#[async_trait]
impl SavedItemStore for MemoryStore {
    async fn add_saved_item(&self, item: &SavedItem) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        let key = item.key();
        let exists = inner
            .saved_items
            .iter()
            .any(|s| s.user_id == item.user_id && s.list == item.list && s.key() == key);
        if exists {
            return Ok(false);
        }
        inner.saved_items.push(item.clone());
        Ok(true)
    }

    async fn list_saved_items(
        &self,
        user_id: UserId,
        list: SavedList,
    ) -> Result<Vec<SavedItem>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .saved_items
            .iter()
            .filter(|s| s.user_id == user_id && s.list == list)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use cartwise_core::Platform;

    use super::*;

    fn ae() -> Country {
        Country::parse("ae").expect("country")
    }

    fn product(id: &str, price: i64) -> ProductRecord {
        ProductRecord {
            platform: Platform::Noon,
            country: ae(),
            external_id: id.to_string(),
            name: format!("Product {id}"),
            images: Vec::new(),
            currency: "AED".to_string(),
            price: Decimal::new(price, 0),
            rating: Some(4.0),
            detail: None,
        }
    }

    fn new_interaction(session_id: SessionId, next: NextStep) -> NewInteraction {
        NewInteraction {
            session_id,
            prompt: "hello".to_string(),
            response: None,
            tool_calls: Vec::new(),
            provider_results: Default::default(),
            search_keywords: Vec::new(),
            added_to_cart: Vec::new(),
            next,
            model: None,
            usage: TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_detail() {
        let store = MemoryStore::new();
        store
            .upsert_products(&[product("N1", 10)])
            .await
            .expect("upsert");
        let key = product("N1", 10).key();
        store
            .set_product_detail(
                &key,
                &ProductDetail {
                    category: Some("Fashion".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("detail");

        store
            .upsert_products(&[product("N1", 12)])
            .await
            .expect("upsert again");

        let cached = store.find_product(&key).await.expect("find").expect("cached");
        assert_eq!(cached.price, Decimal::new(12, 0));
        assert_eq!(
            cached.detail.and_then(|d| d.category).as_deref(),
            Some("Fashion")
        );
        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn test_patch_rejected_after_complete() {
        let store = MemoryStore::new();
        let session = store
            .create_session(UserId::generate(), &ae())
            .await
            .expect("session");
        let interaction = store
            .create_interaction(new_interaction(session.id, NextStep::Complete))
            .await
            .expect("create");

        let result = store
            .patch_interaction(interaction.id, InteractionPatch::default())
            .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_patch_unknown_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .patch_interaction(InteractionId::generate(), InteractionPatch::default())
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_soft_deleted_excluded_from_order_and_usage() {
        let store = MemoryStore::new();
        let session = store
            .create_session(UserId::generate(), &ae())
            .await
            .expect("session");
        let first = store
            .create_interaction(new_interaction(session.id, NextStep::Complete))
            .await
            .expect("first");
        let second = store
            .create_interaction(new_interaction(session.id, NextStep::Complete))
            .await
            .expect("second");

        assert!(store.soft_delete_interaction(first.id).await.expect("delete"));

        let ordered = store.find_ordered(session.id).await.expect("ordered");
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, second.id);

        let usage = store.token_usage(session.id).await.expect("usage");
        assert_eq!(usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_saved_item_insert_if_absent() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let item = SavedItem::snapshot(user_id, SavedList::Cart, &product("N9", 99));

        assert!(store.add_saved_item(&item).await.expect("first add"));
        assert!(!store.add_saved_item(&item).await.expect("second add"));

        let wish = SavedItem::snapshot(user_id, SavedList::Wishlist, &product("N9", 99));
        assert!(store.add_saved_item(&wish).await.expect("wishlist add"));

        let cart = store
            .list_saved_items(user_id, SavedList::Cart)
            .await
            .expect("list");
        assert_eq!(cart.len(), 1);
    }
}
