//! Persistence for the shopping assistant.
//!
//! # Tables
//!
//! - `chat_session` - Conversations, one per "new session" request
//! - `interaction` - One row per turn, patched in place while the turn resumes
//! - `product` - Product cache keyed by `(platform, country, external_id)`
//! - `saved_item` - Cart and wishlist value snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/assistant/migrations/` and run via:
//! ```bash
//! cargo run -p cartwise-cli -- migrate
//! ```
//!
//! Services talk to storage through the traits below so the turn engine can
//! run against [`MemoryStore`] in tests and [`PgStore`] in production.

pub mod interactions;
pub mod memory;
pub mod products;
pub mod saved_items;
pub mod sessions;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use cartwise_core::{
    Country, InteractionId, ProductKey, SavedList, SessionId, UserId,
};

use crate::models::{
    Interaction, InteractionPatch, NewInteraction, ProductDetail, ProductRecord, SavedItem,
    Session, TokenUsage,
};

pub use interactions::InteractionRepository;
pub use memory::MemoryStore;
pub use products::ProductRepository;
pub use saved_items::SavedItemRepository;
pub use sessions::SessionRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Write rejected by a state constraint (e.g., patching a completed turn).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Store Traits
// =============================================================================

/// Chat session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        user_id: UserId,
        country: &Country,
    ) -> Result<Session, RepositoryError>;

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, RepositoryError>;

    /// Sessions for a user, newest first. Disabled sessions are excluded.
    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError>;

    async fn update_session_title(&self, id: SessionId, title: &str)
    -> Result<(), RepositoryError>;
}

/// Append/patch log of turns.
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn create_interaction(
        &self,
        new: NewInteraction,
    ) -> Result<Interaction, RepositoryError>;

    /// Apply the `Some` fields of `patch`.
    ///
    /// Returns `NotFound` for unknown ids and `Conflict` when the turn has
    /// already reached `complete`.
    async fn patch_interaction(
        &self,
        id: InteractionId,
        patch: InteractionPatch,
    ) -> Result<Interaction, RepositoryError>;

    /// Non-deleted interactions of a session in `(created_at, seq)` order.
    async fn find_ordered(&self, session_id: SessionId)
    -> Result<Vec<Interaction>, RepositoryError>;

    async fn find_interaction(
        &self,
        id: InteractionId,
    ) -> Result<Option<Interaction>, RepositoryError>;

    /// Returns `false` when the interaction does not exist.
    async fn soft_delete_interaction(&self, id: InteractionId) -> Result<bool, RepositoryError>;

    /// Token totals over the non-deleted interactions of a session.
    async fn token_usage(&self, session_id: SessionId) -> Result<TokenUsage, RepositoryError>;
}

/// Product cache.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert or refresh products by key. Extended detail is never cleared.
    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<(), RepositoryError>;

    /// Look up an enabled product.
    async fn find_product(&self, key: &ProductKey)
    -> Result<Option<ProductRecord>, RepositoryError>;

    async fn set_product_detail(
        &self,
        key: &ProductKey,
        detail: &ProductDetail,
    ) -> Result<(), RepositoryError>;
}

/// Per-user cart and wishlist snapshots.
#[async_trait]
pub trait SavedItemStore: Send + Sync {
    /// Insert if absent. Returns `true` when a new row was written.
    async fn add_saved_item(&self, item: &SavedItem) -> Result<bool, RepositoryError>;

    async fn list_saved_items(
        &self,
        user_id: UserId,
        list: SavedList,
    ) -> Result<Vec<SavedItem>, RepositoryError>;
}

/// Everything the turn engine needs from storage.
pub trait Store: SessionStore + InteractionLog + ProductStore + SavedItemStore {}

impl<T> Store for T where T: SessionStore + InteractionLog + ProductStore + SavedItemStore {}

// =============================================================================
// PostgreSQL Store
// =============================================================================

/// `PostgreSQL`-backed store delegating to the per-table repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(
        &self,
        user_id: UserId,
        country: &Country,
    ) -> Result<Session, RepositoryError> {
        SessionRepository::new(&self.pool)
            .create(user_id, country)
            .await
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        SessionRepository::new(&self.pool).get(id).await
    }

    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, RepositoryError> {
        SessionRepository::new(&self.pool).list(user_id).await
    }

    async fn update_session_title(
        &self,
        id: SessionId,
        title: &str,
    ) -> Result<(), RepositoryError> {
        SessionRepository::new(&self.pool)
            .update_title(id, title)
            .await
    }
}

#[async_trait]
impl InteractionLog for PgStore {
    async fn create_interaction(
        &self,
        new: NewInteraction,
    ) -> Result<Interaction, RepositoryError> {
        InteractionRepository::new(&self.pool).create(new).await
    }

    async fn patch_interaction(
        &self,
        id: InteractionId,
        patch: InteractionPatch,
    ) -> Result<Interaction, RepositoryError> {
        InteractionRepository::new(&self.pool).patch(id, patch).await
    }

    async fn find_ordered(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        InteractionRepository::new(&self.pool)
            .find_ordered(session_id)
            .await
    }

    async fn find_interaction(
        &self,
        id: InteractionId,
    ) -> Result<Option<Interaction>, RepositoryError> {
        InteractionRepository::new(&self.pool).get(id).await
    }

    async fn soft_delete_interaction(&self, id: InteractionId) -> Result<bool, RepositoryError> {
        InteractionRepository::new(&self.pool).soft_delete(id).await
    }

    async fn token_usage(&self, session_id: SessionId) -> Result<TokenUsage, RepositoryError> {
        InteractionRepository::new(&self.pool)
            .token_usage(session_id)
            .await
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool).upsert_many(products).await
    }

    async fn find_product(
        &self,
        key: &ProductKey,
    ) -> Result<Option<ProductRecord>, RepositoryError> {
        ProductRepository::new(&self.pool).get(key).await
    }

    async fn set_product_detail(
        &self,
        key: &ProductKey,
        detail: &ProductDetail,
    ) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool)
            .set_detail(key, detail)
            .await
    }
}

#[async_trait]
impl SavedItemStore for PgStore {
    async fn add_saved_item(&self, item: &SavedItem) -> Result<bool, RepositoryError> {
        SavedItemRepository::new(&self.pool).insert_if_absent(item).await
    }

    async fn list_saved_items(
        &self,
        user_id: UserId,
        list: SavedList,
    ) -> Result<Vec<SavedItem>, RepositoryError> {
        SavedItemRepository::new(&self.pool).list(user_id, list).await
    }
}
