//! Cartwise assistant library.
//!
//! The conversational shopping assistant as a library, so the binary, the
//! CLI and the integration tests share one implementation.
//!
//! # Layers
//!
//! - [`routes`] - axum handlers
//! - [`services`] - turn engine, history replay, product catalog
//! - [`tools`] - tool registry and handlers the model can call
//! - [`marketplace`] - provider fan-out and adapters
//! - [`llm`] - chat model client
//! - [`db`] - session, interaction, product and cart stores

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod marketplace;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod tools;
