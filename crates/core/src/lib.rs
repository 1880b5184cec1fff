//! Cartwise Core - Shared types library.
//!
//! This crate provides common types used across all Cartwise components:
//! - `assistant` - The conversational shopping assistant service
//! - `cli` - Command-line tools for migrations and debugging
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, marketplace identities and turn status markers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
