//! Generation client adapter.
//!
//! The core only depends on the [`Generator`] trait. [`HttpGenerator`] is the
//! production implementation on top of the `llm` chat-completions client.

use crate::model::GenerationConfig;
use async_trait::async_trait;
use futures::StreamExt;
use llm::{Client, Message, Request, StreamEvent};
use thiserror::Error;
use tracing::debug;

/// Upper bound on generated tokens per request.
const MAX_TOKENS: usize = 2000;

const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You are the narrator of a murder-mystery detective game. \
Stay in character, keep answers concise, and follow the requested output format exactly.";

/// Errors from a generation request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No API key configured. Set one with: config key <your-key>")]
    MissingCredential,

    #[error("Generation endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed response from the generation service: {0}")]
    Malformed(String),

    #[error("Generation service returned an error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Generated case was unusable: {0}")]
    InvalidCase(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid generation config: {0}")]
    InvalidConfig(String),
}

impl From<llm::Error> for GenerationError {
    fn from(e: llm::Error) -> Self {
        match e {
            llm::Error::NoApiKey => GenerationError::MissingCredential,
            llm::Error::NoEndpoint => {
                GenerationError::InvalidConfig("no endpoint URL configured".to_string())
            }
            llm::Error::Unreachable(msg) | llm::Error::Network(msg) => {
                GenerationError::Unreachable(msg)
            }
            llm::Error::Api { status, message } => GenerationError::Upstream { status, message },
            llm::Error::Parse(msg) => GenerationError::Malformed(msg),
            llm::Error::Config(msg) => GenerationError::InvalidConfig(msg),
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the full response in one piece.
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;

    /// Generate incrementally, calling `on_chunk` for each piece of text.
    ///
    /// Returns the concatenation of every chunk.
    async fn generate_streaming(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String, GenerationError>;
}

/// Generator backed by an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone, Default)]
pub struct HttpGenerator;

impl HttpGenerator {
    pub fn new() -> Self {
        Self
    }

    fn client(config: &GenerationConfig) -> Result<Client, GenerationError> {
        if config.key.trim().is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        if config.url.trim().is_empty() {
            return Err(GenerationError::InvalidConfig(
                "no endpoint URL configured".to_string(),
            ));
        }
        Ok(Client::new(config.key.clone())
            .with_endpoint(config.url.clone())
            .with_model(config.model.clone()))
    }

    fn request(prompt: &str) -> Request {
        Request::new(vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)])
            .with_temperature(TEMPERATURE)
            .with_max_tokens(MAX_TOKENS)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let client = Self::client(config)?;
        debug!(model = %config.model, "Sending generation request");
        let response = client.complete(Self::request(prompt)).await?;
        Ok(response.content)
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String, GenerationError> {
        let client = Self::client(config)?;
        debug!(model = %config.model, "Sending streaming generation request");
        let mut stream = client.stream(Self::request(prompt)).await?;

        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: delta } => {
                    on_chunk(&delta);
                    text.push_str(&delta);
                }
                StreamEvent::Finish { reason } => {
                    debug!(?reason, "Generation finished");
                }
                StreamEvent::Done => break,
            }
        }

        if text.is_empty() {
            return Err(GenerationError::Malformed(
                "stream ended without any content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping_is_distinct() {
        assert!(matches!(
            GenerationError::from(llm::Error::NoApiKey),
            GenerationError::MissingCredential
        ));
        assert!(matches!(
            GenerationError::from(llm::Error::Unreachable("refused".into())),
            GenerationError::Unreachable(_)
        ));
        assert!(matches!(
            GenerationError::from(llm::Error::Parse("eof".into())),
            GenerationError::Malformed(_)
        ));
        assert!(matches!(
            GenerationError::from(llm::Error::Api {
                status: 429,
                message: "slow down".into()
            }),
            GenerationError::Upstream { status: 429, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let config = GenerationConfig::default();
        let result = HttpGenerator::new().generate("hello", &config).await;
        assert!(matches!(result, Err(GenerationError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid_config() {
        let config = GenerationConfig {
            url: String::new(),
            key: "sk-test".to_string(),
            model: "gpt-4".to_string(),
        };
        let mut sink = |_: &str| {};
        let result = HttpGenerator::new()
            .generate_streaming("hello", &config, &mut sink)
            .await;
        assert!(matches!(result, Err(GenerationError::InvalidConfig(_))));
    }
}
