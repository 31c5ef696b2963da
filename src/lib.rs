//! Session memory, context compaction and structural chunking for
//! multi-agent LLM routing

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod memory;
pub mod metrics;

pub use config::Config;
pub use error::{ContextError, Result};
