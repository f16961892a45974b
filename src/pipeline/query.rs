//! Query Flow
//!
//! Retrieve, assemble, then generate. Preparation stops at `NoHits` so an
//! empty index never reaches the generator.

use thiserror::Error;
use tracing::{info, warn};

use crate::context::prompt::{Prompt, PromptAssembler};
use crate::documents::index::{IndexError, VectorIndex};
use crate::documents::retriever::{best_score, Hit, Retriever};
use crate::generation::{self, FragmentStream, GenerateError, GenerationMode, Generator};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No results found")]
    NoHits,
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Everything known about a question before generation
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub query: String,
    /// Retrieved hits, highest score first
    pub hits: Vec<Hit>,
    pub best_score: f32,
    /// Best score fell below the confidence floor. A warning, not an error.
    pub low_confidence: bool,
    pub prompt: Prompt,
}

pub struct QueryPipeline<'a, I: VectorIndex + ?Sized> {
    retriever: Retriever<'a, I>,
    assembler: PromptAssembler,
}

impl<'a, I: VectorIndex + ?Sized> QueryPipeline<'a, I> {
    pub fn new(index: &'a I, top_k: usize, assembler: PromptAssembler) -> Self {
        Self {
            retriever: Retriever::new(index, top_k),
            assembler,
        }
    }

    pub fn min_score(&self) -> f32 {
        self.assembler.min_score
    }

    /// Retrieve only; zero hits is `NoHits`
    pub async fn search(&self, query: &str) -> Result<Vec<Hit>, QueryError> {
        let hits = self.retriever.retrieve(query).await?;
        if hits.is_empty() {
            return Err(QueryError::NoHits);
        }
        Ok(hits)
    }

    /// Hits that clear the confidence floor, in retrieval order
    pub fn relevant<'h>(&self, hits: &'h [Hit]) -> Vec<&'h Hit> {
        hits.iter().filter(|h| h.score >= self.assembler.min_score).collect()
    }

    pub async fn prepare(&self, query: &str) -> Result<PreparedQuery, QueryError> {
        let hits = self.search(query).await?;
        let best = best_score(&hits).ok_or(QueryError::NoHits)?;
        let low_confidence = best < self.assembler.min_score;
        if low_confidence {
            warn!(
                best_score = best,
                min_score = self.assembler.min_score,
                "Low confidence retrieval"
            );
        }

        let prompt = self.assembler.assemble(query, &hits);
        Ok(PreparedQuery {
            query: query.to_string(),
            hits,
            best_score: best,
            low_confidence,
            prompt,
        })
    }

    /// Start generation for a prepared query
    pub async fn answer(
        &self,
        prepared: &PreparedQuery,
        generator: &dyn Generator,
        mode: GenerationMode,
    ) -> Result<FragmentStream, QueryError> {
        info!(mode = ?mode, hits = prepared.hits.len(), "Generating answer");
        Ok(generation::answer(generator, &prepared.prompt, mode).await?)
    }

    /// Prepare and generate, collecting the full answer
    pub async fn ask(
        &self,
        query: &str,
        generator: &dyn Generator,
        mode: GenerationMode,
    ) -> Result<(PreparedQuery, String), QueryError> {
        let prepared = self.prepare(query).await?;
        let fragments = self.answer(&prepared, generator, mode).await?;
        let text = generation::collect_stream(fragments).await?;
        Ok((prepared, text))
    }
}
