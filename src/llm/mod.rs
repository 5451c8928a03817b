//! Language-model SQL generation.
//!
//! The model only ever sees a prompt and returns text. Whatever it returns is
//! cleaned, then parsed and validated like any other SQL; output that does not
//! parse sends the engine down the rule-based path.

mod client;
mod prompt;

pub use client::OpenAiCompatibleClient;
pub use prompt::{build_prompt, clean_sql_output, render_schema, SYSTEM_PROMPT};

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response has no content")]
    MissingContent,

    #[error("LLM did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Unparseable LLM response: {0}")]
    Unparseable(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Anything that turns a prompt into SQL text.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Raw model output; callers clean it with [`clean_sql_output`].
    async fn generate(&self, prompt: &str) -> LlmResult<String>;
}
