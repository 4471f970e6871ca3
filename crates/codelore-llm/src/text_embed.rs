//! Client for a standalone sentence-embedding service exposing `POST /embed_multiple`.
//!
//! The service accepts a JSON array of strings and answers with
//! `{"embeddings": [[f32, ...], ...]}` in input order.

use serde::Deserialize;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};
use crate::retry::Backoff;

const BACKOFF: Backoff = Backoff::new("text-embed", 4);

#[derive(Debug, Clone)]
pub struct TextEmbedProvider {
    client: reqwest::Client,
    base_url: String,
}

impl TextEmbedProvider {
    #[must_use]
    pub fn new(mut base_url: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            base_url,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Embed several texts in one request.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-2xx status, or a malformed body.
    pub async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = format!("{}/embed_multiple", self.base_url);
        let response = BACKOFF
            .send(|| self.client.post(&url).json(texts).send())
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                provider: "text-embed".into(),
                status: status.as_u16(),
            });
        }

        let body: EmbedMultipleResponse = serde_json::from_str(&response.text().await?)?;
        Ok(body.embeddings)
    }
}

impl LlmProvider for TextEmbedProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Err(LlmError::ChatUnsupported {
            provider: "text-embed".into(),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_many(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse {
                provider: "text-embed".into(),
            })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn supports_chat(&self) -> bool {
        false
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "text-embed"
    }
}

#[derive(Deserialize)]
struct EmbedMultipleResponse {
    embeddings: Vec<Vec<f32>>,
}
