//! Ingest Flow
//!
//! Directory → documents → chunks → index. Each document is handled on its
//! own: one that yields no text is skipped, one that fails to load or
//! insert is reported, and the run moves on to the next file.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::documents::chunker::Chunker;
use crate::documents::index::VectorIndex;
use crate::documents::indexer::{IndexSummary, Indexer, IndexerError, BATCH_SIZE};
use crate::documents::loader::{discover_documents, load_document, Document, LoaderError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No supported documents found in {}", .0.display())]
    NoDocuments(PathBuf),
    #[error("No text found in {source_file}")]
    NoChunks { source_file: String },
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

/// What happened to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DocumentOutcome {
    Indexed { chunks: usize, batches: usize },
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub source_file: String,
    pub outcome: DocumentOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub documents: Vec<DocumentReport>,
    pub total_chunks: usize,
}

impl IngestReport {
    fn record(&mut self, source_file: String, outcome: DocumentOutcome) {
        if let DocumentOutcome::Indexed { chunks, .. } = outcome {
            self.total_chunks += chunks;
        }
        self.documents.push(DocumentReport {
            source_file,
            outcome,
        });
    }

    pub fn indexed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Indexed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.outcome)).count()
    }
}

pub struct Ingestor<'a, I: VectorIndex + ?Sized> {
    index: &'a I,
    chunker: Chunker,
    batch_size: usize,
}

impl<'a, I: VectorIndex + ?Sized> Ingestor<'a, I> {
    pub fn new(index: &'a I, chunker: Chunker) -> Self {
        Self {
            index,
            chunker,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Ingest every supported file in `dir`, sorted by name.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        let paths = discover_documents(dir)?;
        if paths.is_empty() {
            return Err(IngestError::NoDocuments(dir.to_path_buf()));
        }

        info!(dir = %dir.display(), count = paths.len(), "Starting ingest");
        let mut report = IngestReport::default();

        for path in paths {
            let source_file = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let outcome = match self.ingest_path(&path).await {
                Ok(summary) => DocumentOutcome::Indexed {
                    chunks: summary.chunks,
                    batches: summary.batches,
                },
                Err(IngestError::NoChunks { .. }) => {
                    warn!(file = %source_file, "No text found, skipping");
                    DocumentOutcome::Skipped
                }
                Err(e) => {
                    warn!(file = %source_file, error = %e, "Document ingest failed");
                    DocumentOutcome::Failed { error: e.to_string() }
                }
            };
            report.record(source_file, outcome);
        }

        info!(
            documents = report.documents.len(),
            chunks = report.total_chunks,
            skipped = report.skipped(),
            failed = report.failed(),
            "Ingest complete"
        );
        Ok(report)
    }

    async fn ingest_path(&self, path: &Path) -> Result<IndexSummary, IngestError> {
        let document = load_document(path)?;
        self.ingest_document(&document).await
    }

    /// Chunk and index one document. No chunks at all is `NoChunks`.
    pub async fn ingest_document(
        &self,
        document: &Document,
    ) -> Result<IndexSummary, IngestError> {
        let mut chunks = self.chunker.chunks(document).peekable();
        if chunks.peek().is_none() {
            return Err(IngestError::NoChunks {
                source_file: document.source_file.clone(),
            });
        }

        let summary = Indexer::with_batch_size(self.index, self.batch_size)
            .index_chunks(chunks)
            .await?;
        info!(
            file = %document.source_file,
            chunks = summary.chunks,
            batches = summary.batches,
            "Indexed document"
        );
        Ok(summary)
    }
}
