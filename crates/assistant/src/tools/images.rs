//! `display_product_images`: send a product gallery to the app.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::services::catalog::Catalog;

use super::args::{self, ProductArgs};
use super::{ClientPayload, ToolError, ToolHandler, ToolKind, ToolReply, TurnContext};

pub struct ProductImagesTool {
    catalog: Catalog,
}

impl ProductImagesTool {
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for ProductImagesTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DisplayProductImages
    }

    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError> {
        let ProductArgs { product_id } = args::parse(args)?;
        let product = self
            .catalog
            .resolve(&ctx.country, &product_id)
            .await?
            .ok_or(ToolError::NotFound(product_id))?;

        // Prefer the detail gallery; fall back to the search thumbnails.
        let urls = match product.detail.as_ref() {
            Some(detail) if !detail.images.is_empty() => detail.images.clone(),
            _ => {
                debug!("no gallery cached, using listing images");
                product.images.clone()
            }
        };

        let result = format!("Displayed {} images of {}", urls.len(), product.name);
        Ok(ToolReply::text(result).with_payload(ClientPayload::Images {
            product: product.key(),
            urls,
        }))
    }
}
