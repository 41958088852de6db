//! Embedding provider client (OpenAI-compatible `POST /embeddings`).
//!
//! Product text is embedded into `dimensions`-wide vectors stored in
//! `marketplace.product_embedding` and compared with pgvector cosine distance.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::EmbeddingConfig;

/// Errors from the embedding provider.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding client setup failed: {0}")]
    Setup(String),
    #[error("embedding request timed out")]
    Timeout,
    #[error("embedding request failed: {0}")]
    Http(reqwest::Error),
    #[error("embedding provider error ({status}): {body}")]
    Provider { status: u16, body: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

/// Client for generating text embeddings.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    /// Create a new embedding client. Every request is bounded by `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::Setup` if the API key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
            .map_err(|_| EmbeddingError::Setup("API key is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or the response is malformed.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding data in response".into()))
    }

    /// Embed several texts in one request; output order matches input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or the response is malformed.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let response: EmbeddingResponse = response.json().await?;
        collect_embeddings(response, texts.len(), self.dimensions)
    }
}

/// Order by `index` and check count and width.
fn collect_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }

    response.data.sort_by_key(|d| d.index);

    response
        .data
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            if d.embedding.len() == dimensions {
                Ok(d.embedding)
            } else {
                Err(EmbeddingError::InvalidResponse(format!(
                    "embedding {i} has {} dimensions, expected {dimensions}",
                    d.embedding.len()
                )))
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_results_follow_index_order() {
        let resp = response(
            r#"{"data":[{"index":1,"embedding":[2.0,2.0]},{"index":0,"embedding":[1.0,1.0]}]}"#,
        );
        let out = collect_embeddings(resp, 2, 2).unwrap();
        assert_eq!(out, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let resp = response(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
        assert!(matches!(
            collect_embeddings(resp, 2, 1),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let resp = response(r#"{"data":[{"index":0,"embedding":[1.0,2.0,3.0]}]}"#);
        assert!(matches!(
            collect_embeddings(resp, 1, 1536),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let texts = ["a", "b"];
        let body = serde_json::to_value(EmbeddingRequest {
            model: "m",
            input: &texts,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"model": "m", "input": ["a", "b"]}));
    }
}
