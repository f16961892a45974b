//! Answer Generation
//!
//! One capability with two protocols. Blocking returns the whole answer;
//! streaming yields text fragments in arrival order. Callers that only want
//! fragments go through [`answer`], where blocking degenerates to a stream
//! of length one.

pub mod ollama;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::context::prompt::Prompt;

pub use ollama::OllamaGenerator;

/// Default token cap per answer
pub const NUM_PREDICT: u32 = 350;
pub const TEMPERATURE: f32 = 0.5;
/// Default deadline for one generation request
pub const ANSWER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Generation backend error: {0}")]
    Backend(String),
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Generation HTTP error: {0}")]
    Http(String),
}

/// Fragments of one answer, in arrival order
pub type FragmentStream = BoxStream<'static, Result<String, GenerateError>>;

/// Sampling settings shared by both protocols
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_predict: u32,
    #[serde(skip)]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
            num_predict: NUM_PREDICT,
            timeout: ANSWER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Blocking,
    Streaming,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Full answer, trimmed
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerateError>;

    /// Fragments as the backend produces them. The stream ends on the
    /// completion signal or when the connection closes.
    async fn generate_stream(&self, prompt: &Prompt) -> Result<FragmentStream, GenerateError>;
}

/// Answer fragments for either mode
pub async fn answer(
    generator: &dyn Generator,
    prompt: &Prompt,
    mode: GenerationMode,
) -> Result<FragmentStream, GenerateError> {
    match mode {
        GenerationMode::Blocking => {
            let text = generator.generate(prompt).await?;
            Ok(stream::iter([Ok(text)]).boxed())
        }
        GenerationMode::Streaming => generator.generate_stream(prompt).await,
    }
}

/// Concatenate a fragment stream. Any error discards the partial text.
pub async fn collect_stream(fragments: FragmentStream) -> Result<String, GenerateError> {
    fragments
        .try_fold(String::new(), |mut acc, fragment| async move {
            acc.push_str(&fragment);
            Ok(acc)
        })
        .await
}
