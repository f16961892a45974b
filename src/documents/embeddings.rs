//! Text Embeddings
//!
//! The embedding capability maps text to fixed-size vectors. Two
//! implementations: Ollama's `/api/embed` endpoint for real corpora, and a
//! deterministic feature-hashing embedder for tests and offline runs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Dimensionality of hashed embeddings
pub const HASHING_DIM: usize = 256;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding HTTP error: {0}")]
    Http(String),
    #[error("Embedding backend error: {0}")]
    Backend(String),
    #[error("Malformed embedding response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::Http(e.to_string())
    }
}

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Maps text to fixed-size vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("no embedding returned".to_string()))
    }
}

/// Embedder backed by an Ollama server
#[derive(Clone)]
pub struct OllamaEmbedder {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, count = texts.len(), "Embedding batch");
        let resp = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Ollama embed error");
            return Err(EmbeddingError::Backend(format!("{}: {}", status, text)));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

/// Feature-hashing embedder.
///
/// Each token is lowercased, stripped of surrounding punctuation and hashed
/// into one of `dim` buckets; the term-frequency vector is L2-normalized.
/// The same text always yields the same vector.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dim: HASHING_DIM }
    }
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut tf = vec![0.0f32; self.dim];

        for token in text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| !t.is_empty())
        {
            tf[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm: f32 = tf.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut tf {
                *x /= norm;
            }
        }
        tf
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
