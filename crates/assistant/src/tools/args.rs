//! Typed tool arguments.
//!
//! Field names match the JSON schema in [`super::schema`].

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ToolError;

/// Parse tool arguments into `T`.
///
/// # Errors
///
/// Returns `ToolError::Argument` when the arguments do not match `T`.
pub fn parse<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    T::deserialize(args).map_err(|e| ToolError::Argument(e.to_string()))
}

/// A value the model may send either alone or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    OneOrMany::deserialize(deserializer).map(Vec::from)
}

/// `search_products` arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    #[serde(deserialize_with = "one_or_many")]
    pub keywords: Vec<String>,
    #[serde(default, alias = "search_index")]
    pub category: Option<String>,
    #[serde(default, alias = "minPrice")]
    pub min_price: Option<f64>,
    #[serde(default, alias = "maxPrice")]
    pub max_price: Option<f64>,
}

/// Validated search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub keywords: Vec<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl SearchArgs {
    /// Trim keywords and check the price range.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Argument` for empty keywords, negative prices or
    /// an inverted range.
    pub fn validate(self) -> Result<SearchParams, ToolError> {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(ToString::to_string)
            .collect();
        if keywords.is_empty() {
            return Err(ToolError::Argument("keywords must not be empty".to_string()));
        }

        let min_price = self.min_price.map(price).transpose()?;
        let max_price = self.max_price.map(price).transpose()?;
        if let (Some(min), Some(max)) = (min_price, max_price)
            && min > max
        {
            return Err(ToolError::Argument(format!(
                "min_price {min} is greater than max_price {max}"
            )));
        }

        Ok(SearchParams {
            keywords,
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            min_price,
            max_price,
        })
    }
}

fn price(value: f64) -> Result<Decimal, ToolError> {
    if value < 0.0 {
        return Err(ToolError::Argument(format!("price {value} is negative")));
    }
    Decimal::try_from(value).map_err(|e| ToolError::Argument(e.to_string()))
}

/// `display_products` arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayArgs {
    #[serde(rename = "productIds", deserialize_with = "one_or_many")]
    pub product_ids: Vec<String>,
}

/// Arguments naming one product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductArgs {
    #[serde(rename = "productId")]
    pub product_id: String,
}

/// `add_to_cart` arguments; accepts `productId` or `productIds`.
#[derive(Debug, Clone, Deserialize)]
pub struct CartArgs {
    #[serde(rename = "productId", default)]
    product_id: Option<String>,
    #[serde(rename = "productIds", default, deserialize_with = "optional_list")]
    product_ids: Option<Vec<String>>,
}

fn optional_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<OneOrMany>::deserialize(deserializer).map(|value| value.map(Vec::from))
}

impl CartArgs {
    /// All requested ids, in order, without duplicates.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Argument` when no id was given.
    pub fn ids(self) -> Result<Vec<String>, ToolError> {
        let mut ids: Vec<String> = Vec::new();
        for id in self
            .product_id
            .into_iter()
            .chain(self.product_ids.unwrap_or_default())
        {
            let id = id.trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(ToolError::Argument(
                "productId or productIds is required".to_string(),
            ));
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_search_args_accepts_search_index_alias() {
        let args: SearchArgs = parse(&json!({
            "keywords": ["blue", " hoodie "],
            "search_index": "fashion",
            "max_price": 150
        }))
        .unwrap();

        let params = args.validate().unwrap();
        assert_eq!(params.keywords, ["blue", "hoodie"]);
        assert_eq!(params.category.as_deref(), Some("fashion"));
        assert_eq!(params.max_price, Some(Decimal::new(150, 0)));
        assert_eq!(params.min_price, None);
    }

    #[test]
    fn test_search_args_single_keyword_string() {
        let args: SearchArgs = parse(&json!({"keywords": "hoodie"})).unwrap();
        assert_eq!(args.validate().unwrap().keywords, ["hoodie"]);
    }

    #[test]
    fn test_search_args_rejects_empty_keywords() {
        let args: SearchArgs = parse(&json!({"keywords": ["  "]})).unwrap();
        assert!(matches!(args.validate(), Err(ToolError::Argument(_))));
    }

    #[test]
    fn test_search_args_rejects_inverted_range() {
        let args: SearchArgs =
            parse(&json!({"keywords": ["tv"], "min_price": 500, "max_price": 100})).unwrap();
        assert!(matches!(args.validate(), Err(ToolError::Argument(_))));
    }

    #[test]
    fn test_missing_keywords_is_argument_error() {
        let result = parse::<SearchArgs>(&json!({"category": "fashion"}));
        assert!(matches!(result, Err(ToolError::Argument(_))));
    }

    #[test]
    fn test_cart_args_merge_and_dedupe() {
        let args: CartArgs =
            parse(&json!({"productId": "amazon:B1", "productIds": ["noon:N1", "amazon:B1"]}))
                .unwrap();
        assert_eq!(args.ids().unwrap(), ["amazon:B1", "noon:N1"]);
    }

    #[test]
    fn test_cart_args_requires_an_id() {
        let args: CartArgs = parse(&json!({})).unwrap();
        assert!(args.ids().is_err());
    }
}
