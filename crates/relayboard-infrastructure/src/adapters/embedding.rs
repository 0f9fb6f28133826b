//! HTTP-backed embedding generation (spec §6 "Embedding service", §4.2 step 5).
//!
//! Embedding failures are non-fatal to indexing: [`embed`](EmbeddingService::embed)
//! returns `None` rather than propagating, so chunks persist without a
//! vector and remain full-text searchable.

use async_trait::async_trait;
use relayboard_domain::error::Result;
use relayboard_domain::ports::EmbeddingService;
use serde::Deserialize;
use serde_json::json;

/// Calls a configured embedding API over HTTP.
pub struct HttpEmbeddingService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingService {
    /// Construct a service targeting `base_url`'s embeddings endpoint.
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, api_key, model }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&json!({ "model": self.model, "input": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "embedding request failed; chunk will persist without a vector");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "embedding API returned an error; chunk will persist without a vector");
            return Ok(None);
        }

        match response.json::<EmbeddingResponse>().await {
            Ok(body) => Ok(Some(body.embedding)),
            Err(e) => {
                tracing::warn!(error = %e, "embedding response was malformed; chunk will persist without a vector");
                Ok(None)
            }
        }
    }

    async fn chunk_text(&self, text: &str) -> Result<Vec<String>> {
        use relayboard_domain::entities::project::{CHUNK_OVERLAP_CHARS, TARGET_CHUNK_CHARS};

        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let step = TARGET_CHUNK_CHARS.saturating_sub(CHUNK_OVERLAP_CHARS).max(1);
        while start < chars.len() {
            let end = (start + TARGET_CHUNK_CHARS).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        Ok(chunks)
    }
}
