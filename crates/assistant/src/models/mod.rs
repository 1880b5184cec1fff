//! Domain models for the shopping assistant.

pub mod interaction;
pub mod product;
pub mod session;

pub use interaction::{
    Interaction, InteractionPatch, NewInteraction, ProviderResults, TokenUsage, ToolCallRecord,
};
pub use product::{ProductDetail, ProductRecord, SavedItem, SAVED_NAME_MAX_CHARS};
pub use session::{DEFAULT_SESSION_TITLE, Session};
