//! Chunk Indexing
//!
//! Inserts chunks into the similarity index in fixed-size batches, one
//! insert call per batch, sequentially. A failed batch stops the run;
//! batches already inserted stay in the index.

use thiserror::Error;
use tracing::{error, info};
use ulid::Ulid;

use super::chunker::Chunk;
use super::index::{IndexError, IndexRecord, VectorIndex};

/// Default number of chunks per insert call
pub const BATCH_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Insert of batch {batch} failed: {source}")]
    Insert {
        /// 1-based batch number
        batch: usize,
        #[source]
        source: IndexError,
    },
}

/// Totals for one indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSummary {
    pub chunks: usize,
    pub batches: usize,
}

pub struct Indexer<'a, I: VectorIndex + ?Sized> {
    index: &'a I,
    batch_size: usize,
}

impl<'a, I: VectorIndex + ?Sized> Indexer<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self::with_batch_size(index, BATCH_SIZE)
    }

    /// A zero batch size is treated as 1
    pub fn with_batch_size(index: &'a I, batch_size: usize) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Insert every chunk under a freshly generated id.
    pub async fn index_chunks<C>(&self, chunks: C) -> Result<IndexSummary, IndexerError>
    where
        C: IntoIterator<Item = Chunk>,
    {
        let mut summary = IndexSummary::default();
        let mut batch: Vec<IndexRecord> = Vec::with_capacity(self.batch_size);

        for chunk in chunks {
            batch.push(to_record(chunk));
            if batch.len() == self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.flush(full, &mut summary).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(batch, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn flush(
        &self,
        batch: Vec<IndexRecord>,
        summary: &mut IndexSummary,
    ) -> Result<(), IndexerError> {
        let number = summary.batches + 1;
        let count = batch.len();

        self.index.insert(batch).await.map_err(|source| {
            error!(batch = number, error = %source, "Batch insert failed");
            IndexerError::Insert { batch: number, source }
        })?;

        summary.batches = number;
        summary.chunks += count;
        info!(batch = number, count = count, "Added chunk batch");
        Ok(())
    }
}

fn to_record(chunk: Chunk) -> IndexRecord {
    let metadata = chunk.metadata();
    IndexRecord {
        id: Ulid::new().to_string(),
        text: chunk.text,
        metadata,
    }
}
