//! Document Retrieval
//!
//! Queries the similarity index and turns raw distances into confidence
//! scores. No filtering happens here; relevance thresholds belong to
//! prompt assembly.

use serde::Serialize;
use tracing::debug;

use super::chunker::ChunkMetadata;
use super::index::{IndexError, RawHit, VectorIndex};

/// Default number of hits requested per query
pub const TOP_K: usize = 4;

/// A retrieved chunk with its confidence score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// `1 - distance`; at most 1.0, unbounded below
    pub score: f32,
}

impl Hit {
    pub fn from_raw(raw: RawHit) -> Self {
        Self {
            text: raw.text,
            metadata: raw.metadata,
            score: score_from_distance(raw.distance),
        }
    }

    pub fn label(&self) -> String {
        self.metadata.label()
    }

    /// One-line excerpt of at most `max_chars` characters, `…` when cut
    pub fn preview(&self, max_chars: usize) -> String {
        let mut out: String = self
            .text
            .chars()
            .take(max_chars)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        if self.text.chars().nth(max_chars).is_some() {
            out.push('…');
        }
        out
    }
}

/// Confidence score for a lower-is-closer distance
pub fn score_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// Highest score in a hit list
pub fn best_score(hits: &[Hit]) -> Option<f32> {
    hits.iter().map(|h| h.score).reduce(f32::max)
}

pub struct Retriever<'a, I: VectorIndex + ?Sized> {
    index: &'a I,
    top_k: usize,
}

impl<'a, I: VectorIndex + ?Sized> Retriever<'a, I> {
    pub fn new(index: &'a I, top_k: usize) -> Self {
        Self { index, top_k }
    }

    /// At most `top_k` hits, highest score first. A sparse index yields fewer.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Hit>, IndexError> {
        let mut raw = self.index.query(query, self.top_k).await?;
        raw.truncate(self.top_k);
        debug!(
            top_k = self.top_k,
            count = raw.len(),
            metric = self.index.metric().as_space(),
            "Retrieved hits"
        );
        Ok(raw.into_iter().map(Hit::from_raw).collect())
    }
}
