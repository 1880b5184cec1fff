//! Business logic between the routes and the stores.

pub mod catalog;
pub mod history;
pub mod prompts;
pub mod turn;

pub use catalog::Catalog;
pub use turn::{TurnEngine, TurnError, TurnPhase, TurnResult};
