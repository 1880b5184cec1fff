//! `display_products`: show cached products as cards.

use async_trait::async_trait;
use serde_json::Value;

use crate::services::catalog::Catalog;

use super::args::{self, DisplayArgs};
use super::{ClientPayload, ToolError, ToolHandler, ToolKind, ToolReply, TurnContext};

pub struct DisplayProductsTool {
    catalog: Catalog,
}

impl DisplayProductsTool {
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for DisplayProductsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DisplayProducts
    }

    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError> {
        let DisplayArgs { product_ids } = args::parse(args)?;

        // Ids that do not resolve are dropped without an error.
        let mut products = Vec::with_capacity(product_ids.len());
        for id in &product_ids {
            if let Some(product) = self.catalog.resolve(&ctx.country, id).await?
                && !products.contains(&product)
            {
                products.push(product);
            }
        }

        let listed = products
            .iter()
            .map(|p| format!("{} ({})", p.key().qualified_id(), p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let result = if products.is_empty() {
            "Displayed 0 products".to_string()
        } else {
            format!("Displayed {} products: {listed}", products.len())
        };

        Ok(ToolReply::text(result).with_payload(ClientPayload::Products { products }))
    }
}
