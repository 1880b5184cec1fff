//! `add_to_cart`: snapshot products into the user's cart.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use cartwise_core::SavedList;

use crate::models::SavedItem;
use crate::services::catalog::Catalog;

use super::args::{self, CartArgs};
use super::{ClientPayload, ToolEffects, ToolError, ToolHandler, ToolKind, ToolReply, TurnContext};

pub struct AddToCartTool {
    catalog: Catalog,
}

impl AddToCartTool {
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for AddToCartTool {
    fn kind(&self) -> ToolKind {
        ToolKind::AddToCart
    }

    async fn call(&self, ctx: &TurnContext, args: &Value) -> Result<ToolReply, ToolError> {
        let ids = args::parse::<CartArgs>(args)?.ids()?;

        let mut added = Vec::new();
        let mut already = Vec::new();
        let mut missing = Vec::new();
        let mut items = Vec::new();

        for id in ids {
            let Some(product) = self.catalog.resolve(&ctx.country, &id).await? else {
                missing.push(id);
                continue;
            };
            let item = SavedItem::snapshot(ctx.user_id, SavedList::Cart, &product);
            if self.catalog.store().add_saved_item(&item).await? {
                added.push(product.name.clone());
            } else {
                already.push(product.name.clone());
            }
            items.push(item);
        }

        info!(
            added = added.len(),
            already = already.len(),
            missing = missing.len(),
            "cart updated"
        );

        if items.is_empty() {
            return Err(ToolError::NotFound(missing.join(", ")));
        }

        let mut parts = Vec::new();
        if !added.is_empty() {
            parts.push(format!("Added to cart: {}", added.join(", ")));
        }
        if !already.is_empty() {
            parts.push(format!("Already in cart: {}", already.join(", ")));
        }
        if !missing.is_empty() {
            parts.push(format!("Not found: {}", missing.join(", ")));
        }

        Ok(ToolReply {
            result: Value::String(parts.join(". ")),
            effects: ToolEffects {
                added_to_cart: items.iter().map(SavedItem::key).collect(),
                ..ToolEffects::default()
            },
            payload: Some(ClientPayload::AddedToCart { items }),
        })
    }
}
