//! # ragjudge core
//!
//! Core library for ragjudge. Provides the judge LLM interface (brain),
//! the OpenAI-compatible provider, configuration and fundamental types.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{JudgeSettings, RagJudgeConfig, load_config};
pub use error::{ConfigError, CoreError, LlmError, Result};
pub use providers::{OpenAiCompatibleProvider, create_provider};
pub use types::{
    CompletionRequest, CompletionResponse, Message, ResponseFormat, Role, TokenUsage,
};
