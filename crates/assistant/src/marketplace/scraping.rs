//! Hosted scraping service client.
//!
//! The service fetches a target page and applies CSS extraction rules,
//! returning the extracted fields as JSON. Rules use the service's format:
//!
//! ```json
//! {"products": {"type": "all", "selector": ".item",
//!               "output": {"name": "h2", "image": {"selector": "img", "output": "@src"}}}}
//! ```

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ScraperConfig;

use super::ProviderError;

/// Client for the scraping service.
#[derive(Clone)]
pub struct ScrapingClient {
    inner: Arc<ScrapingClientInner>,
}

struct ScrapingClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl ScrapingClient {
    /// Create a new scraping client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ScraperConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(ScrapingClientInner {
                client,
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
            }),
        })
    }

    /// Fetch `target` and apply `rules`.
    ///
    /// `wait_ms` asks the service to wait for client-side rendering before
    /// extracting.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on transport failures, error statuses, or a
    /// non-JSON body.
    #[instrument(skip(self, rules), fields(host = target.host_str().unwrap_or_default()))]
    pub async fn extract(
        &self,
        target: &Url,
        rules: &Value,
        wait_ms: Option<u64>,
    ) -> Result<Value, ProviderError> {
        let mut params = vec![
            ("api_key", self.inner.api_key.expose_secret().to_string()),
            ("url", target.to_string()),
            ("extract_rules", rules.to_string()),
        ];
        if let Some(wait) = wait_ms {
            params.push((
                "js_scenario",
                serde_json::json!({"steps": [{"wait": wait}]}).to_string(),
            ));
        }

        let response = self
            .inner
            .client
            .get(&self.inner.base_url)
            .query(&params)
            .send()
            .await
            .map_err(redacted)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(redacted)?;
        debug!(bytes = body.len(), "scraping service responded");
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse(format!("scraping service returned invalid JSON: {e}")))
    }
}

/// Drop the request URL from a transport error; it carries the API key.
fn redacted(err: reqwest::Error) -> ProviderError {
    ProviderError::Http(err.without_url())
}

// =============================================================================
// Extraction helpers
// =============================================================================

/// A trimmed, non-empty string field of an extracted item.
pub(super) fn text_field<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// An extracted list of strings, tolerating a single string in its place.
pub(super) fn string_list(item: &Value, field: &str) -> Vec<String> {
    match item.get(field) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Parse a rating such as `"4.5 out of 5 stars"` or `"4.2"`.
pub(super) fn parse_rating(raw: &str) -> Option<f32> {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.replace(',', ".").parse::<f32>().ok())
        .filter(|rating| (0.0..=5.0).contains(rating))
}
