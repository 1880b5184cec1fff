//! Database operations for the product cache.

use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use cartwise_core::{Country, Platform, ProductKey};

use super::RepositoryError;
use crate::models::{ProductDetail, ProductRecord};

/// Internal row type for `PostgreSQL` product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    platform: Platform,
    country: String,
    external_id: String,
    name: String,
    images: Vec<String>,
    currency: String,
    price: Decimal,
    rating: Option<f32>,
    detail: Option<serde_json::Value>,
}

impl TryFrom<ProductRow> for ProductRecord {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let country = Country::parse(&row.country).map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.external_id))
        })?;
        let detail = row
            .detail
            .map(serde_json::from_value::<ProductDetail>)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!(
                    "product {} detail: {e}",
                    row.external_id
                ))
            })?;

        Ok(Self {
            platform: row.platform,
            country,
            external_id: row.external_id,
            name: row.name,
            images: row.images,
            currency: row.currency,
            price: row.price,
            rating: row.rating,
            detail,
        })
    }
}

/// Repository for product cache operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of sightings in one transaction.
    ///
    /// Concurrent writers race per key; the last write wins. The `detail`
    /// column is left untouched on conflict.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails.
    pub async fn upsert_many(&self, products: &[ProductRecord]) -> Result<(), RepositoryError> {
        if products.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for product in products {
            sqlx::query(
                r"
                INSERT INTO product (
                    platform, country, external_id, name, images, currency, price, rating
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (platform, country, external_id) DO UPDATE SET
                    name = EXCLUDED.name,
                    images = EXCLUDED.images,
                    currency = EXCLUDED.currency,
                    price = EXCLUDED.price,
                    rating = COALESCE(EXCLUDED.rating, product.rating),
                    updated_at = NOW()
                ",
            )
            .bind(product.platform)
            .bind(&product.country)
            .bind(&product.external_id)
            .bind(&product.name)
            .bind(&product.images)
            .bind(&product.currency)
            .bind(product.price)
            .bind(product.rating)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Get an enabled product by key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, key: &ProductKey) -> Result<Option<ProductRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT platform, country, external_id, name, images, currency, price, rating, detail
            FROM product
            WHERE platform = $1 AND country = $2 AND external_id = $3 AND NOT is_disabled
            ",
        )
        .bind(key.platform)
        .bind(&key.country)
        .bind(&key.external_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Store extended detail for a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not cached.
    pub async fn set_detail(
        &self,
        key: &ProductKey,
        detail: &ProductDetail,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE product SET detail = $4, updated_at = NOW()
            WHERE platform = $1 AND country = $2 AND external_id = $3
            ",
        )
        .bind(key.platform)
        .bind(&key.country)
        .bind(&key.external_id)
        .bind(Json(detail))
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
