//! Product cache and saved-item models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartwise_core::{Country, Platform, Price, ProductKey, SavedList, UserId};

/// Maximum characters of a product name kept in a saved-item snapshot.
pub const SAVED_NAME_MAX_CHARS: usize = 25;

/// A marketplace item as last seen by a provider.
///
/// Identity is `(platform, country, external_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub platform: Platform,
    pub country: Country,
    pub external_id: String,
    pub name: String,
    pub images: Vec<String>,
    /// Currency symbol as displayed by the marketplace.
    pub currency: String,
    pub price: Decimal,
    pub rating: Option<f32>,
    /// Extended detail, populated lazily by a detail fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ProductDetail>,
}

impl ProductRecord {
    #[must_use]
    pub fn key(&self) -> ProductKey {
        ProductKey::new(self.platform, self.country.clone(), self.external_id.clone())
    }

    #[must_use]
    pub fn price(&self) -> Price {
        Price::new(self.price, self.currency.clone())
    }

    /// One model-facing line block describing this product.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let rating = self
            .rating
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.1}"));
        format!(
            "Title: {}\nid: {}\nPrice: {}\nRating: {}",
            self.name,
            self.key().qualified_id(),
            self.price().display(),
            rating
        )
    }
}

/// Extended product information returned by a detail lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(default)]
    pub feature_bullets: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Raw key/value information table from the product page.
    #[serde(default)]
    pub product_information: Option<serde_json::Value>,
    /// Gallery images from the product page; not returned to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ProductDetail {
    /// Whether the detail carries anything beyond images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.feature_bullets.is_empty()
            && self.category.is_none()
            && self.brand.is_none()
            && self.product_information.is_none()
    }

    /// The fields shown to the model (everything except images).
    #[must_use]
    pub fn model_view(&self) -> serde_json::Value {
        serde_json::json!({
            "feature_bullets": self.feature_bullets,
            "category": self.category,
            "brand": self.brand,
            "product_information": self.product_information,
        })
    }
}

/// A value snapshot of a product in one of a user's saved lists.
///
/// Snapshots do not follow later price or name changes in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem {
    pub user_id: UserId,
    pub list: SavedList,
    pub platform: Platform,
    pub country: Country,
    pub external_id: String,
    pub name: String,
    pub images: Vec<String>,
    pub currency: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl SavedItem {
    /// Snapshot a cached product into a saved list.
    #[must_use]
    pub fn snapshot(user_id: UserId, list: SavedList, product: &ProductRecord) -> Self {
        Self {
            user_id,
            list,
            platform: product.platform,
            country: product.country.clone(),
            external_id: product.external_id.clone(),
            name: product.name.chars().take(SAVED_NAME_MAX_CHARS).collect(),
            images: product.images.clone(),
            currency: product.currency.clone(),
            price: product.price,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ProductKey {
        ProductKey::new(self.platform, self.country.clone(), self.external_id.clone())
    }
}
