//! Per-session conversation memory with summarization on overflow

pub mod models;
pub mod storage;
pub mod store;

pub use models::{
    format_context_for_model, CompactContext, ModelFormat, RecentContext, SessionDescriptor, SessionRecord, Turn,
};
pub use storage::{InMemoryStorage, JsonFileStorage, SessionStorage};
pub use store::{AppendOutcome, SessionMemoryStore};
