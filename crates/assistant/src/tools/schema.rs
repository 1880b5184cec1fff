//! JSON schemas of the tools offered to the model.
//!
//! Argument names here must stay in sync with [`super::args`]; bump
//! [`TOOL_SCHEMA_VERSION`] when either side changes.

use serde_json::{Value, json};

use crate::llm::types::FunctionDefinition;
use crate::llm::ToolDefinition;

use super::ToolKind;

/// Version of the tool contract; recorded in logs with every turn.
pub const TOOL_SCHEMA_VERSION: u32 = 3;

/// Definitions for `kinds`, in the given order.
#[must_use]
pub fn tool_definitions(kinds: &[ToolKind]) -> Vec<ToolDefinition> {
    kinds.iter().map(|kind| definition(*kind)).collect()
}

fn definition(kind: ToolKind) -> ToolDefinition {
    let (description, parameters) = match kind {
        ToolKind::SearchProducts => (
            "Search the marketplaces for products matching the user's request. \
             Call at most once per reply.",
            search_parameters(),
        ),
        ToolKind::DisplayProducts => (
            "Show products to the user as cards. Use ids exactly as returned by search.",
            object(
                json!({"productIds": string_array("Product ids, e.g. amazon:B0C1234567")}),
                &["productIds"],
            ),
        ),
        ToolKind::GetProductDetails => (
            "Get feature bullets, brand, category and specifications for one product.",
            object(json!({"productId": product_id()}), &["productId"]),
        ),
        ToolKind::DisplayProductImages => (
            "Show the image gallery of one product to the user.",
            object(json!({"productId": product_id()}), &["productId"]),
        ),
        ToolKind::AddToCart => (
            "Add one or more products to the user's cart.",
            object(
                json!({
                    "productId": product_id(),
                    "productIds": string_array("Several product ids to add at once"),
                }),
                &[],
            ),
        ),
    };

    ToolDefinition {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: kind.as_str().to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

fn search_parameters() -> Value {
    object(
        json!({
            "keywords": string_array("Short search terms, most important first"),
            "category": {
                "type": "string",
                "description": "Marketplace department, e.g. fashion, electronics, beauty. Omit to search everything."
            },
            "min_price": {"type": "number", "description": "Minimum price in local currency"},
            "max_price": {"type": "number", "description": "Maximum price in local currency"},
        }),
        &["keywords"],
    )
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn string_array(description: &str) -> Value {
    json!({"type": "array", "items": {"type": "string"}, "description": description})
}

fn product_id() -> Value {
    json!({"type": "string", "description": "Product id as returned by search"})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_follow_requested_order() {
        let definitions = tool_definitions(&ToolKind::ALL);
        let names: Vec<_> = definitions
            .iter()
            .map(|d| d.function.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "search_products",
                "display_products",
                "get_product_details",
                "display_product_images",
                "add_to_cart"
            ]
        );
    }

    #[test]
    fn test_follow_up_subset_excludes_search() {
        let definitions = tool_definitions(&ToolKind::follow_up());
        assert!(
            definitions
                .iter()
                .all(|d| d.function.name != "search_products")
        );
    }

    #[test]
    fn test_search_schema_requires_keywords() {
        let definitions = tool_definitions(&[ToolKind::SearchProducts]);
        let parameters = &definitions[0].function.parameters;
        assert_eq!(parameters["required"], json!(["keywords"]));
        assert_eq!(parameters["properties"]["keywords"]["type"], "array");
    }
}
