//! `search_products`: concurrent marketplace fan-out.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::marketplace::{SearchQuery, SearchStage};
use crate::models::ProviderResults;
use crate::models::session::title_from_keywords;
use crate::services::catalog::Catalog;

use super::args::{self, SearchArgs, SearchParams};
use super::{ClientPayload, ToolEffects, ToolError, ToolHandler, ToolKind, ToolReply, TurnContext};

pub struct SearchProductsTool {
    catalog: Catalog,
    result_limit: usize,
}

impl SearchProductsTool {
    #[must_use]
    pub const fn new(catalog: Catalog, result_limit: usize) -> Self {
        Self {
            catalog,
            result_limit,
        }
    }
}

#[async_trait]
impl ToolHandler for SearchProductsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SearchProducts
    }

    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError> {
        let params = args::parse::<SearchArgs>(args)?.validate()?;
        let query = search_query(ctx, &params);

        let results = self
            .catalog
            .marketplaces()
            .search(SearchStage::Primary, &query)
            .await;
        self.catalog.record_results(&results).await?;

        if ctx.rename_session {
            let title = title_from_keywords(&params.keywords);
            self.catalog
                .store()
                .update_session_title(ctx.session_id, &title)
                .await?;
            info!(title = %title, "session renamed from first search");
        }

        Ok(ToolReply {
            result: Value::String(format_results_table(&results, self.result_limit)),
            payload: Some(ClientPayload::SearchResults {
                results: results.clone(),
            }),
            effects: ToolEffects {
                search_keywords: Some(params.keywords),
                provider_results: results,
                added_to_cart: Vec::new(),
            },
        })
    }
}

/// Build the provider query for validated search parameters.
#[must_use]
pub fn search_query(ctx: &TurnContext, params: &SearchParams) -> SearchQuery {
    SearchQuery {
        country: ctx.country.clone(),
        keywords: params.keywords.clone(),
        category: params.category.clone(),
        min_price: params.min_price,
        max_price: params.max_price,
    }
}

/// Model-facing table of search results, at most `limit` products per
/// platform, in platform order.
#[must_use]
pub fn format_results_table(results: &ProviderResults, limit: usize) -> String {
    results
        .iter()
        .map(|(platform, products)| {
            if products.is_empty() {
                return format!("{} results: no products found", platform.display_name());
            }
            let rows = products
                .iter()
                .take(limit)
                .map(crate::models::ProductRecord::summary_line)
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("{} results:\n{rows}", platform.display_name())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use cartwise_core::{Country, Platform};

    use crate::models::ProductRecord;

    use super::*;

    fn product(platform: Platform, id: &str, name: &str) -> ProductRecord {
        ProductRecord {
            platform,
            country: Country::parse("ae").unwrap(),
            external_id: id.to_string(),
            name: name.to_string(),
            images: vec![],
            currency: "AED".to_string(),
            price: Decimal::new(4950, 2),
            rating: Some(4.5),
            detail: None,
        }
    }

    #[test]
    fn test_format_results_table_truncates_per_platform() {
        let mut results = ProviderResults::new();
        results.insert(
            Platform::Amazon,
            vec![
                product(Platform::Amazon, "B1", "Blue Hoodie"),
                product(Platform::Amazon, "B2", "Navy Hoodie"),
            ],
        );
        results.insert(Platform::Noon, vec![]);

        let table = format_results_table(&results, 1);

        assert_eq!(
            table,
            "Amazon results:\nTitle: Blue Hoodie\nid: amazon:B1\nPrice: AED 49.50\nRating: 4.5\n\n\
             noon results: no products found"
        );
    }

    #[test]
    fn test_format_results_table_empty() {
        assert_eq!(format_results_table(&ProviderResults::new(), 10), "");
    }
}
