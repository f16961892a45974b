// Scholas Library
// Exports core modules for use by the CLI binary

pub mod chroma;
pub mod config;
pub mod context;
pub mod documents;
pub mod generation;
pub mod pipeline;

#[cfg(test)]
mod test_util;

// Re-export commonly used types for the CLI
pub use chroma::{ChromaClient, ChromaError, ChromaIndex};
pub use config::{ConfigError, Settings};
pub use context::{FallbackPolicy, Prompt, PromptAssembler};
pub use documents::{
    Chunker, DistanceMetric, Embedder, Hit, IndexError, MemoryIndex, OllamaEmbedder, VectorIndex,
};
pub use generation::{GenerateError, GenerationMode, GenerationOptions, Generator, OllamaGenerator};
pub use pipeline::{
    DocumentOutcome, IngestError, IngestReport, Ingestor, PreparedQuery, QueryError, QueryPipeline,
};
