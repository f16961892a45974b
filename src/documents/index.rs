//! Similarity Index Capability
//!
//! The index stores chunk text with provenance and an embedding, and
//! answers nearest-neighbour queries.
//!
//! Distance contract: `query` returns hits ordered by ascending distance,
//! and a lower distance always means a closer match. The retriever's
//! `score = 1 - distance` relies on this, so an implementation whose metric
//! grows with similarity must convert to a distance before returning.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::chunker::ChunkMetadata;
use super::embeddings::{cosine_similarity, Embedder, Embedding, EmbeddingError};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index backend error: {0}")]
    Backend(String),
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Malformed index response: {0}")]
    Malformed(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Distance space of an index. Every variant is lower-is-closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Squared Euclidean distance
    L2,
    /// `1 - cosine similarity`
    Cosine,
    /// `1 - dot product`
    InnerProduct,
}

impl DistanceMetric {
    pub fn from_space(space: &str) -> Option<Self> {
        match space.to_lowercase().as_str() {
            "l2" => Some(DistanceMetric::L2),
            "cosine" => Some(DistanceMetric::Cosine),
            "ip" => Some(DistanceMetric::InnerProduct),
            _ => None,
        }
    }

    /// Name understood by Chroma's `hnsw:space` setting
    pub fn as_space(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

/// One entry to insert
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Unique for the lifetime of the index
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One query result as the index reports it
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records in one call. Existing entries are never updated.
    async fn insert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError>;

    /// The `n_results` nearest entries, ascending by distance.
    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<RawHit>, IndexError>;

    async fn count(&self) -> Result<usize, IndexError>;

    fn metric(&self) -> DistanceMetric;

    /// End of the handle's lifecycle
    async fn close(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

struct StoredEntry {
    record: IndexRecord,
    embedding: Embedding,
}

/// In-process index with cosine distance
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Copies of every stored record, in insertion order
    pub fn records(&self) -> Vec<IndexRecord> {
        self.entries.read().iter().map(|e| e.record.clone()).collect()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn insert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        if records.is_empty() {
            return Err(IndexError::InvalidInput("records cannot be empty".to_string()));
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(IndexError::Malformed(format!(
                "{} embeddings for {} records",
                embeddings.len(),
                records.len()
            )));
        }

        let mut entries = self.entries.write();
        if let Some(dup) = records.iter().find(|r| entries.iter().any(|e| e.record.id == r.id)) {
            return Err(IndexError::InvalidInput(format!("duplicate id: {}", dup.id)));
        }
        entries.extend(
            records
                .into_iter()
                .zip(embeddings)
                .map(|(record, embedding)| StoredEntry { record, embedding }),
        );
        debug!(count = entries.len(), "Memory index insert");
        Ok(())
    }

    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<RawHit>, IndexError> {
        let query_embedding = self.embedder.embed_one(query_text).await?;

        let entries = self.entries.read();
        let mut hits: Vec<RawHit> = entries
            .iter()
            .map(|entry| RawHit {
                text: entry.record.text.clone(),
                metadata: entry.record.metadata.clone(),
                distance: 1.0 - cosine_similarity(&query_embedding, &entry.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.entries.read().len())
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}
