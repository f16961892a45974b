//! Chroma Vector Database Integration
//!
//! REST client and the collection-backed similarity index.

pub mod client;
pub mod collections;

pub use client::{ChromaClient, ChromaError, ChromaQueryResult, CollectionInfo};
pub use collections::{ChromaIndex, COLLECTION_DOCUMENTS};
