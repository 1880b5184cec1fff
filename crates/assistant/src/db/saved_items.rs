//! Database operations for cart and wishlist snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use cartwise_core::{Country, Platform, SavedList, UserId};

use super::RepositoryError;
use crate::models::SavedItem;

/// Internal row type for `PostgreSQL` saved item queries.
#[derive(Debug, sqlx::FromRow)]
struct SavedItemRow {
    user_id: Uuid,
    list: SavedList,
    platform: Platform,
    country: String,
    external_id: String,
    name: String,
    images: Vec<String>,
    currency: String,
    price: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<SavedItemRow> for SavedItem {
    type Error = RepositoryError;

    fn try_from(row: SavedItemRow) -> Result<Self, Self::Error> {
        let country = Country::parse(&row.country).map_err(|e| {
            RepositoryError::DataCorruption(format!("saved item {}: {e}", row.external_id))
        })?;

        Ok(Self {
            user_id: UserId::new(row.user_id),
            list: row.list,
            platform: row.platform,
            country,
            external_id: row.external_id,
            name: row.name,
            images: row.images,
            currency: row.currency,
            price: row.price,
            created_at: row.created_at,
        })
    }
}

/// Repository for saved item operations.
pub struct SavedItemRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SavedItemRepository<'a> {
    /// Create a new saved item repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a snapshot unless the same product is already in that list.
    ///
    /// # Returns
    ///
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn insert_if_absent(&self, item: &SavedItem) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO saved_item (
                user_id, list, platform, country, external_id, name, images, currency, price
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, list, platform, country, external_id) DO NOTHING
            ",
        )
        .bind(item.user_id)
        .bind(item.list)
        .bind(item.platform)
        .bind(&item.country)
        .bind(&item.external_id)
        .bind(&item.name)
        .bind(&item.images)
        .bind(&item.currency)
        .bind(item.price)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// List a user's saved items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user_id: UserId,
        list: SavedList,
    ) -> Result<Vec<SavedItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, SavedItemRow>(
            r"
            SELECT user_id, list, platform, country, external_id, name, images,
                   currency, price, created_at
            FROM saved_item
            WHERE user_id = $1 AND list = $2
            ORDER BY created_at ASC
            ",
        )
        .bind(user_id)
        .bind(list)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
