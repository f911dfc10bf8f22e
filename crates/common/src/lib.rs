//! NavalQA Common Library
//!
//! Shared code for the NavalQA services including:
//! - The retrieval pipeline (subject extraction, resolution, media, citations)
//! - Knowledge source and answer composer abstractions
//! - Conversation history
//! - Error types and handling
//! - Configuration management
//! - Metrics and outbound politeness

pub mod composer;
pub mod config;
pub mod errors;
pub mod history;
pub mod knowledge;
pub mod metrics;
pub mod pipeline;
pub mod politeness;

// Re-export commonly used types
pub use composer::AnswerComposer;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use history::ConversationHistory;
pub use knowledge::KnowledgeSource;
pub use pipeline::{AnswerPayload, Collaborators, Orchestrator};
pub use politeness::Politeness;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
