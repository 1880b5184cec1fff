//! `get_product_details`: extended fields for one product.

use async_trait::async_trait;
use serde_json::Value;

use crate::services::catalog::Catalog;

use super::args::{self, ProductArgs};
use super::{ToolError, ToolHandler, ToolKind, ToolReply, TurnContext};

pub struct ProductDetailsTool {
    catalog: Catalog,
}

impl ProductDetailsTool {
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for ProductDetailsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::GetProductDetails
    }

    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError> {
        let ProductArgs { product_id } = args::parse(args)?;
        let product = self
            .catalog
            .resolve(&ctx.country, &product_id)
            .await?
            .ok_or(ToolError::NotFound(product_id))?;

        let detail = self.catalog.detail(&product).await?;

        Ok(ToolReply {
            result: detail.model_view(),
            payload: None,
            effects: super::ToolEffects::default(),
        })
    }
}
