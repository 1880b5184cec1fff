//! Marketplace identities: platforms, countries and product keys.
//!
//! External item ids are only unique within a platform and country, so every
//! cached product is addressed by the full [`ProductKey`] triple.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An external marketplace backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "marketplace_platform", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Amazon,
    Noon,
}

impl Platform {
    /// All known platforms, in default search order.
    pub const ALL: [Self; 2] = [Self::Amazon, Self::Noon];

    /// Stable lowercase name used in URLs, ids and configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Noon => "noon",
        }
    }

    /// Human-readable storefront name used in model-facing text.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::Noon => "noon",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown platform name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown marketplace platform: {0}")]
pub struct PlatformError(pub String);

impl std::str::FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Self::Amazon),
            "noon" => Ok(Self::Noon),
            other => Err(PlatformError(other.to_string())),
        }
    }
}

/// Two-letter lowercase marketplace country code (e.g. `ae`, `eg`, `sa`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Country(String);

/// Error returned for malformed country codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid country code: {0:?} (expected two ASCII letters)")]
pub struct CountryError(pub String);

impl Country {
    /// Parse and normalize a country code.
    ///
    /// # Errors
    ///
    /// Returns `CountryError` unless the input is exactly two ASCII letters.
    pub fn parse(code: &str) -> Result<Self, CountryError> {
        let trimmed = code.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(CountryError(code.to_string()))
        }
    }

    /// The normalized code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Country {
    type Err = CountryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Country {
    type Error = CountryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Country> for String {
    fn from(country: Country) -> Self {
        country.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Country {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Country {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&raw)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Country {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// Stable identity of a marketplace item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductKey {
    pub platform: Platform,
    pub country: Country,
    pub external_id: String,
}

impl ProductKey {
    #[must_use]
    pub fn new(platform: Platform, country: Country, external_id: impl Into<String>) -> Self {
        Self {
            platform,
            country,
            external_id: external_id.into(),
        }
    }

    /// Platform-qualified id (`amazon:B0ABC123`) that resolves unambiguously
    /// within a session's country.
    #[must_use]
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.platform, self.external_id)
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.platform, self.country, self.external_id)
    }
}
