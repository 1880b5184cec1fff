//! Amazon storefront provider.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use cartwise_core::{Country, Platform, parse_amount};

use crate::models::{ProductDetail, ProductRecord};

use super::scraping::{ScrapingClient, parse_rating, string_list, text_field};
use super::{MarketplaceProvider, ProviderError, SearchQuery};

/// Department used when the model gives no category ("all departments").
const DEFAULT_SEARCH_INDEX: &str = "aps";

/// Amazon search and product pages via the scraping service.
#[derive(Clone)]
pub struct AmazonProvider {
    scraper: ScrapingClient,
}

impl AmazonProvider {
    #[must_use]
    pub const fn new(scraper: ScrapingClient) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl MarketplaceProvider for AmazonProvider {
    fn platform(&self) -> Platform {
        Platform::Amazon
    }

    #[instrument(skip(self, query), fields(platform = "amazon", country = %query.country))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductRecord>, ProviderError> {
        let url = search_url(query)?;
        let extracted = self.scraper.extract(&url, &search_rules(), None).await?;
        Ok(parse_search(&extracted, &query.country))
    }

    #[instrument(skip(self), fields(platform = "amazon"))]
    async fn detail(
        &self,
        country: &Country,
        external_id: &str,
    ) -> Result<ProductDetail, ProviderError> {
        let url = detail_url(country, external_id)?;
        let extracted = self.scraper.extract(&url, &detail_rules(), None).await?;
        Ok(parse_detail(&extracted))
    }
}

// =============================================================================
// URLs and extraction rules
// =============================================================================

/// Storefront domain for a country (`ae` -> `www.amazon.ae`).
fn domain(country: &Country) -> String {
    let tld = match country.as_str() {
        "us" => "com",
        "gb" | "uk" => "co.uk",
        "jp" => "co.jp",
        other => other,
    };
    format!("https://www.amazon.{tld}")
}

fn search_url(query: &SearchQuery) -> Result<Url, ProviderError> {
    let mut url = Url::parse(&format!("{}/s", domain(&query.country)))
        .map_err(|e| ProviderError::Parse(e.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("language", "en")
            .append_pair("k", &query.phrase())
            .append_pair(
                "i",
                query.category.as_deref().unwrap_or(DEFAULT_SEARCH_INDEX),
            );
        if let Some(min) = query.min_price {
            pairs.append_pair("low-price", &min.to_string());
        }
        if let Some(max) = query.max_price {
            pairs.append_pair("high-price", &max.to_string());
        }
    }
    Ok(url)
}

fn detail_url(country: &Country, external_id: &str) -> Result<Url, ProviderError> {
    let mut url = Url::parse(&format!("{}/dp/{external_id}", domain(country)))
        .map_err(|e| ProviderError::Parse(e.to_string()))?;
    url.query_pairs_mut().append_pair("language", "en");
    Ok(url)
}

fn search_rules() -> Value {
    json!({
        "products": {
            "type": "all",
            "selector": ".s-result-item:not(.AdHolder)",
            "output": {
                "asin": {"selector": ".a-declarative", "output": "@data-csa-c-item-id"},
                "name": {"selector": "h2", "output": "text"},
                "currency": ".a-price-symbol",
                "price": ".a-price-whole",
                "rating": ".a-icon-alt",
                "image": {"selector": ".s-image", "output": "@src"}
            }
        }
    })
}

fn detail_rules() -> Value {
    json!({
        "feature_bullets": {
            "type": "all",
            "selector": "#feature-bullets .a-list-item",
            "output": "text"
        },
        "brand": "#bylineInfo",
        "category": "#wayfinding-breadcrumbs_feature_div",
        "images": {
            "type": "all",
            "selector": ".imageThumbnail img",
            "output": "@src"
        }
    })
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize extracted search items. Items without an id or a price are
/// skipped (placeholders and "see options" tiles).
fn parse_search(extracted: &Value, country: &Country) -> Vec<ProductRecord> {
    extracted
        .get("products")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| parse_search_item(item, country))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_search_item(item: &Value, country: &Country) -> Option<ProductRecord> {
    let external_id = normalize_asin(text_field(item, "asin")?)?;
    let name = text_field(item, "name")?.to_string();
    let price = parse_amount(text_field(item, "price")?)?;

    Some(ProductRecord {
        platform: Platform::Amazon,
        country: country.clone(),
        external_id,
        name,
        images: text_field(item, "image")
            .map(|src| vec![full_size_image(src)])
            .unwrap_or_default(),
        currency: text_field(item, "currency").unwrap_or_default().to_string(),
        price,
        rating: text_field(item, "rating").and_then(parse_rating),
        detail: None,
    })
}

/// The item id attribute looks like `amzn1.asin.B0C1234567:amzn1.deal...`.
fn normalize_asin(raw: &str) -> Option<String> {
    let head = raw.split(':').next()?;
    let asin = head.rsplit('.').next()?.trim();
    (!asin.is_empty()).then(|| asin.to_string())
}

/// Strip the thumbnail size suffix (`71abc._AC_UL320_.jpg` -> `71abc.jpg`).
fn full_size_image(src: &str) -> String {
    match src.find("._") {
        Some(idx) => format!("{}.jpg", src.get(..idx).unwrap_or(src)),
        None => src.to_string(),
    }
}

fn parse_detail(extracted: &Value) -> ProductDetail {
    let mut images: Vec<String> = string_list(extracted, "images")
        .iter()
        .map(|src| full_size_image(src))
        .collect();
    images.dedup();

    ProductDetail {
        feature_bullets: string_list(extracted, "feature_bullets"),
        category: text_field(extracted, "category").map(collapse_whitespace),
        brand: text_field(extracted, "brand").map(ToString::to_string),
        product_information: None,
        images,
    }
}

/// Breadcrumbs come back with layout whitespace between segments.
fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn ae() -> Country {
        Country::parse("ae").unwrap()
    }

    #[test]
    fn test_search_url() {
        let query = SearchQuery {
            country: ae(),
            keywords: vec!["blue".to_string(), "hoodie".to_string()],
            category: Some("fashion".to_string()),
            min_price: Some(Decimal::new(50, 0)),
            max_price: None,
        };

        let url = search_url(&query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.amazon.ae/s?language=en&k=blue+hoodie&i=fashion&low-price=50"
        );
    }

    #[test]
    fn test_search_url_defaults_to_all_departments() {
        let query = SearchQuery {
            country: Country::parse("us").unwrap(),
            keywords: vec!["mug".to_string()],
            category: None,
            min_price: None,
            max_price: None,
        };

        let url = search_url(&query).unwrap();
        assert!(url.as_str().starts_with("https://www.amazon.com/s?"));
        assert!(url.as_str().contains("i=aps"));
    }

    #[test]
    fn test_parse_search_normalizes_items() {
        let extracted = json!({
            "products": [
                {
                    "asin": "amzn1.asin.B0C1234567:amzn1.deal.1",
                    "name": " Blue Hoodie ",
                    "currency": "AED",
                    "price": "1,249",
                    "rating": "4.5 out of 5 stars",
                    "image": "https://m.media-amazon.com/images/I/71abc._AC_UL320_.jpg"
                },
                {"asin": "amzn1.asin.B0NOPRICE", "name": "Sold out", "price": ""},
                {"name": "No id", "price": "10"}
            ]
        });

        let products = parse_search(&extracted, &ae());

        assert_eq!(products.len(), 1);
        let product = &products[0];
        assert_eq!(product.external_id, "B0C1234567");
        assert_eq!(product.name, "Blue Hoodie");
        assert_eq!(product.price, Decimal::new(1249, 0));
        assert_eq!(product.rating, Some(4.5));
        assert_eq!(
            product.images,
            ["https://m.media-amazon.com/images/I/71abc.jpg"]
        );
    }

    #[test]
    fn test_parse_search_without_products_key() {
        assert!(parse_search(&json!({"error": "blocked"}), &ae()).is_empty());
    }

    #[test]
    fn test_parse_detail() {
        let extracted = json!({
            "feature_bullets": ["Soft fleece", "  ", "Kangaroo pocket"],
            "brand": "Visit the Acme Store",
            "category": "Fashion\n  ›\n  Men",
            "images": [
                "https://m.media-amazon.com/images/I/1._AC_US40_.jpg",
                "https://m.media-amazon.com/images/I/1._AC_US40_.jpg"
            ]
        });

        let detail = parse_detail(&extracted);

        assert_eq!(detail.feature_bullets, ["Soft fleece", "Kangaroo pocket"]);
        assert_eq!(detail.brand.as_deref(), Some("Visit the Acme Store"));
        assert_eq!(detail.category.as_deref(), Some("Fashion › Men"));
        assert_eq!(detail.images, ["https://m.media-amazon.com/images/I/1.jpg"]);
    }
}
