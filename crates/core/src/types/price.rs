//! Marketplace prices using decimal arithmetic.
//!
//! Providers report prices as display strings (`"1,299.00"`, `"AED 49.50"`)
//! with the currency as a bare symbol, so the currency here is kept as the
//! symbol the marketplace showed rather than an ISO code.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with the currency symbol the marketplace displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Decimal,
    pub currency: String,
}

impl Price {
    #[must_use]
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Format for model-facing text (e.g., `"AED 49.50"`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("{} {:.2}", self.currency, self.amount)
    }
}

/// Parse a marketplace price string into a decimal amount.
///
/// Thousands separators and any non-numeric prefix or suffix are dropped.
/// Returns `None` when no number can be recovered.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
