//! Document Handling Module
//!
//! Loading, chunking, embedding, indexing and retrieval of source documents.

pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod retriever;

// Re-export key public types
pub use chunker::{Chunk, ChunkMetadata, Chunker, ChunkerError};
pub use embeddings::{Embedder, Embedding, EmbeddingError, HashingEmbedder, OllamaEmbedder};
pub use index::{DistanceMetric, IndexError, IndexRecord, MemoryIndex, RawHit, VectorIndex};
pub use indexer::{IndexSummary, Indexer, IndexerError};
pub use loader::{discover_documents, load_document, Document, LoaderError};
pub use retriever::{best_score, score_from_distance, Hit, Retriever};
