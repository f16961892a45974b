//! End-to-end flows over the document and generation modules.

pub mod ingest;
pub mod query;

pub use ingest::{DocumentOutcome, DocumentReport, IngestError, IngestReport, Ingestor};
pub use query::{PreparedQuery, QueryError, QueryPipeline};
