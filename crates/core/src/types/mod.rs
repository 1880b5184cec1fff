//! Core types for Cartwise.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod marketplace;
pub mod price;
pub mod status;

pub use id::*;
pub use marketplace::{Country, CountryError, Platform, PlatformError, ProductKey};
pub use price::{Price, parse_amount};
pub use status::*;
