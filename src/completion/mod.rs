//! Request/response text completion used by the HTTP text endpoints

pub mod openai;
pub mod prompts;

use futures::stream::BoxStream;

use crate::error::Result;

pub use openai::OpenAiCompleter;

/// Incremental completion output
pub type TextStream = BoxStream<'static, Result<String>>;

/// Turns a prompt plus user text into model output
#[async_trait::async_trait]
pub trait TextCompleter: Send + Sync {
    /// Full completion in one string
    async fn complete(&self, text: &str, prompt: &str, model: &str) -> Result<String>;

    /// Completion streamed as it is generated
    async fn complete_stream(&self, text: &str, prompt: &str, model: &str) -> Result<TextStream>;
}

/// Single user message combining the instructions and the text
pub fn build_prompt(prompt: &str, text: &str) -> String {
    format!("{}\n\nBelow is the text to be processed:\n\n{}\n\n", prompt, text)
}
