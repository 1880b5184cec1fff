//! noon storefront provider.
//!
//! noon only serves a handful of countries, each under its own locale path.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;
use url::Url;

use cartwise_core::{Country, Platform, parse_amount};

use crate::models::{ProductDetail, ProductRecord};

use super::scraping::{ScrapingClient, parse_rating, string_list, text_field};
use super::{MarketplaceProvider, ProviderError, SearchQuery};

const BASE_URL: &str = "https://www.noon.com";

/// Search pages render client-side; wait this long before extracting.
const RENDER_WAIT_MS: u64 = 250;

/// noon search and product pages via the scraping service.
#[derive(Clone)]
pub struct NoonProvider {
    scraper: ScrapingClient,
}

impl NoonProvider {
    #[must_use]
    pub const fn new(scraper: ScrapingClient) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl MarketplaceProvider for NoonProvider {
    fn platform(&self) -> Platform {
        Platform::Noon
    }

    #[instrument(skip(self, query), fields(platform = "noon", country = %query.country))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProductRecord>, ProviderError> {
        let url = search_url(query)?;
        let extracted = self
            .scraper
            .extract(&url, &search_rules(), Some(RENDER_WAIT_MS))
            .await?;
        Ok(parse_search(&extracted, &query.country))
    }

    #[instrument(skip(self), fields(platform = "noon"))]
    async fn detail(
        &self,
        country: &Country,
        external_id: &str,
    ) -> Result<ProductDetail, ProviderError> {
        let url = detail_url(country, external_id)?;
        let extracted = self
            .scraper
            .extract(&url, &detail_rules(), Some(RENDER_WAIT_MS))
            .await?;
        Ok(parse_detail(&extracted))
    }
}

// =============================================================================
// URLs and extraction rules
// =============================================================================

/// Locale path segment for a country.
fn locale(country: &Country) -> Result<&'static str, ProviderError> {
    match country.as_str() {
        "eg" => Ok("egypt-en"),
        "ae" => Ok("uae-en"),
        "sa" => Ok("saudi-en"),
        _ => Err(ProviderError::UnsupportedCountry {
            platform: Platform::Noon,
            country: country.clone(),
        }),
    }
}

fn search_url(query: &SearchQuery) -> Result<Url, ProviderError> {
    let mut url = Url::parse(&format!("{BASE_URL}/{}/search/", locale(&query.country)?))
        .map_err(|e| ProviderError::Parse(e.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", &query.phrase());
        if let Some(min) = query.min_price {
            pairs.append_pair("f[price][min]", &min.to_string());
        }
        if let Some(max) = query.max_price {
            pairs.append_pair("f[price][max]", &max.to_string());
        }
    }
    Ok(url)
}

fn detail_url(country: &Country, external_id: &str) -> Result<Url, ProviderError> {
    Url::parse(&format!("{BASE_URL}/{}/{external_id}/p/", locale(country)?))
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

fn search_rules() -> Value {
    json!({
        "products": {
            "type": "all",
            "selector": ".productContainer",
            "output": {
                "asin": {"selector": "a", "output": "@id"},
                "name": {"selector": "[data-qa='product-name']", "output": "@title"},
                "currency": ".currency",
                "price": ".amount",
                "rating": "[class*='rating']",
                "images": {"type": "all", "selector": "img", "output": "@src"}
            }
        }
    })
}

fn detail_rules() -> Value {
    json!({
        "feature_bullets": {
            "type": "all",
            "selector": "[class*='highlights'] li",
            "output": "text"
        },
        "brand": "[data-qa='pdp-brand']",
        "specifications": {
            "type": "all",
            "selector": "[class*='specifications'] tr",
            "output": {"name": "td:first-child", "value": "td:last-child"}
        },
        "images": {
            "type": "all",
            "selector": "[class*='gallery'] img",
            "output": "@src"
        }
    })
}

// =============================================================================
// Normalization
// =============================================================================

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
    let external_id = normalize_sku(text_field(item, "asin")?);
    let name = text_field(item, "name")?.to_string();
    let price = parse_amount(text_field(item, "price")?)?;

    Some(ProductRecord {
        platform: Platform::Noon,
        country: country.clone(),
        external_id,
        name,
        images: clean_images(&string_list(item, "images")),
        currency: text_field(item, "currency").unwrap_or_default().to_string(),
        price,
        rating: text_field(item, "rating").and_then(parse_rating),
        detail: None,
    })
}

/// Link ids look like `productBox-N53346840A`; the sku follows the first dash.
fn normalize_sku(raw: &str) -> String {
    raw.split_once('-')
        .map_or(raw, |(_, sku)| sku)
        .trim()
        .to_string()
}

/// Drop icons (png/svg) and query strings, dedupe and sort.
fn clean_images(sources: &[String]) -> Vec<String> {
    sources
        .iter()
        .filter(|src| {
            let lower = src.to_ascii_lowercase();
            !lower.ends_with(".png") && !lower.ends_with(".svg")
        })
        .map(|src| src.split('?').next().unwrap_or(src).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn parse_detail(extracted: &Value) -> ProductDetail {
    let specifications: serde_json::Map<String, Value> = extracted
        .get("specifications")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let name = text_field(row, "name")?;
                    let value = text_field(row, "value")?;
                    Some((name.to_string(), Value::String(value.to_string())))
                })
                .collect()
        })
        .unwrap_or_default();

    ProductDetail {
        feature_bullets: string_list(extracted, "feature_bullets"),
        category: None,
        brand: text_field(extracted, "brand").map(ToString::to_string),
        product_information: (!specifications.is_empty()).then_some(Value::Object(specifications)),
        images: clean_images(&string_list(extracted, "images")),
    }
}
