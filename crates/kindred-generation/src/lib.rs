//! Language-model and image-generation backends.
//!
//! The server never talks to a provider directly; it holds an
//! `Arc<dyn ChatBackend>` and an `Arc<dyn ImageBackend>` so that tests can
//! substitute fakes. [`OpenAiClient`] implements both traits against any
//! OpenAI-compatible HTTP API.
//!
//! [`persona`] builds the prompts and parses the model output for friend
//! creation and conversation replies.

pub mod config;
pub mod error;
pub mod image;
pub mod openai;
pub mod persona;

pub use config::GenerationConfig;
pub use error::{GenerationError, OUT_OF_CREDITS_MESSAGE};
pub use image::{GeneratedImage, ImageBackend};
pub use openai::OpenAiClient;
pub use persona::{PersonaDraft, ReplyContext};

use async_trait::async_trait;

/// A single-shot chat completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// The full instruction, sent as the system message.
    pub system_prompt: String,
    /// Ask the provider to return a JSON object.
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn text(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            json_mode: false,
        }
    }

    pub fn json(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            json_mode: true,
        }
    }
}

/// Something that turns a prompt into text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns the first choice's message content.
    ///
    /// Implementations must return [`GenerationError::Empty`] rather than an
    /// empty string when the provider produced nothing.
    async fn complete(&self, request: ChatRequest) -> Result<String, GenerationError>;
}
